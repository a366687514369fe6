//! JVM access flags

use bitflags::bitflags;

bitflags! {
    /// Access and property flags for classes, fields and methods.
    ///
    /// Values follow the JVM specification tables 4.1-A, 4.5-A and 4.6-A.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        const PUBLIC       = 0x0001;
        const PRIVATE      = 0x0002;
        const PROTECTED    = 0x0004;
        const STATIC       = 0x0008;
        const FINAL        = 0x0010;
        /// ACC_SUPER on classes, ACC_SYNCHRONIZED on methods.
        const SUPER        = 0x0020;
        const VOLATILE     = 0x0040;
        const TRANSIENT    = 0x0080;
        const NATIVE       = 0x0100;
        const INTERFACE    = 0x0200;
        const ABSTRACT     = 0x0400;
        const STRICT       = 0x0800;
        const SYNTHETIC    = 0x1000;
        const ANNOTATION   = 0x2000;
        const ENUM         = 0x4000;
    }
}

impl AccessFlags {
    pub fn is_static(self) -> bool {
        self.contains(AccessFlags::STATIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(AccessFlags::PRIVATE)
    }

    pub fn is_interface(self) -> bool {
        self.contains(AccessFlags::INTERFACE)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(AccessFlags::ABSTRACT)
    }

    pub fn is_enum(self) -> bool {
        self.contains(AccessFlags::ENUM)
    }
}

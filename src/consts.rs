//! Naming conventions for generated members and the host types the
//! generated code calls into.
//!
//! Everything the engine adds to a class carries the `_sw$` prefix so that
//! generated members can never collide with user code and are easy to spot
//! in decompiled output.

/// Prefix for all generated fields and methods.
pub const GEN_PREFIX: &str = "_sw$";

/// Suffix appended to a member name to form its companion field.
pub const COMPANION_SUFFIX: &str = "_sw$companion";

/// Generated method that writes one wire index token.
pub const M_WRITE_IDX: &str = "_sw$writeSyncIdx";
/// Generated method that reads one wire index token.
pub const M_READ_IDX: &str = "_sw$readSyncIdx";
/// Generated check-and-send routine, fired from the spliced tick hook.
pub const M_DO_SYNC: &str = "_sw$doSync";
/// Generated dirty-check routine.
pub const M_IS_DIRTY: &str = "_sw$isDirty";
/// Generated routine writing this class's changed members.
pub const M_WRITE: &str = "_sw$write";
/// Generated read-back loop (SyncedObject surface).
pub const M_READ: &str = "_sw$read";
/// Generated single-token dispatcher the read loop branches through.
pub const M_READ_MEMBER: &str = "_sw$readMember";
/// Generated method returning the declaring class constant, used for the
/// most-derived-class check.
pub const M_SYNC_CLASS: &str = "_sw$syncClass";
/// Generated NBT writer.
pub const M_WRITE_NBT: &str = "_sw$writeNbt";
/// Generated NBT reader.
pub const M_READ_NBT: &str = "_sw$readNbt";

/// Owner field injected into extended-properties classes.
pub const F_PROPS_OWNER: &str = "_sw$propsOwner";
/// Identifier field injected into extended-properties classes.
pub const F_PROPS_IDENT: &str = "_sw$propsIdent";

/// Marker interface implemented by every instrumented class.
pub const SYNCED_OBJECT: &str = "syncweave/runtime/SyncedObject";
/// Marker interface implemented by instrumented extended-properties classes.
pub const SYNCED_PROPS: &str = "syncweave/runtime/SyncedEntityProperties";
/// Static hook class the generated code calls for buffer creation and
/// packet dispatch.
pub const SYNC_HOOKS: &str = "syncweave/runtime/SyncHooks";

pub const SYNC_HOOKS_CREATE: &str = "createBuilder";
pub const SYNC_HOOKS_SEND: &str = "sendFinished";
pub const SYNC_HOOKS_WRITE: &str = "write";
pub const SYNC_HOOKS_READ_PREFIX: &str = "read_";

/// Methods on the SyncedEntityProperties surface.
pub const PROPS_GET_ENTITY: &str = "_sw$getPropsEntity";
pub const PROPS_GET_IDENT: &str = "_sw$getPropsIdent";
pub const PROPS_INJECT: &str = "_sw$injectPropsData";

/// Host base types checked during classification.
pub const CLASS_ENTITY: &str = "net/minecraft/entity/Entity";
pub const CLASS_TILE_ENTITY: &str = "net/minecraft/tileentity/TileEntity";
pub const CLASS_CONTAINER: &str = "net/minecraft/inventory/Container";
pub const IFACE_EXT_PROPS: &str = "net/minecraftforge/common/IExtendedEntityProperties";

/// Interface a user-supplied syncer implements.
pub const VALUE_SYNCER: &str = "syncweave/runtime/ValueSyncer";
/// Prefix of the generated static holder field for a custom syncer
/// instance.
pub const SYNCER_FIELD_PREFIX: &str = "_sw$syncer$";

/// Host buffer types the generated wire code targets.
pub const WRITABLE_BUF: &str = "syncweave/runtime/WritableDataBuf";
pub const READABLE_BUF: &str = "syncweave/runtime/DataBuf";

/// Host NBT types.
pub const NBT_COMPOUND: &str = "net/minecraft/nbt/NBTTagCompound";
pub const NBT_BASE: &str = "net/minecraft/nbt/NBTBase";
/// Static helper that turns arbitrary reference values into tags and back.
pub const NBT_HOOKS: &str = "syncweave/runtime/NbtHooks";

/// Annotation descriptors recognized during discovery.
pub const ANN_SYNC: &str = "Lsyncweave/annotations/Sync;";
pub const ANN_TO_NBT: &str = "Lsyncweave/annotations/ToNbt;";

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// Tick/update method per sync category.
pub const TICK_ENTITY: &str = "onUpdate";
pub const TICK_TILE_ENTITY: &str = "updateEntity";
pub const TICK_CONTAINER: &str = "detectAndSendChanges";
pub const TICK_EXT_PROPS: &str = "_sw$tick";

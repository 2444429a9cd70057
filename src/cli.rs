//! CLI surface (§6 "Exit codes", §4.9 `pool`/`db` subcommands). Generalizes
//! the teacher's flat `scan`/`release`/`maintenance`/`reset`/`gc`/`full`
//! subcommand enum into the operation set this system actually exposes:
//! sync, snapshot, publish/unpublish, and integrity/GC, each with its own
//! nested subcommand the way a multi-noun CLI would structure it.

use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// chantal: content-addressed mirror, snapshot and publisher engine for
/// RPM/DEB/Helm/APK repositories
pub(crate) struct Chantal {
    /// path to the global YAML configuration file
    #[argh(option, short = 'c', default = "String::from(\"chantal.yaml\")")]
    pub config: String,
    #[argh(subcommand)]
    pub command: ChantalCommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum ChantalCommand {
    Sync(SyncCmd),
    CheckUpdates(CheckUpdatesCmd),
    Snapshot(SnapshotCmd),
    ViewSnapshot(ViewSnapshotCmd),
    Publish(PublishCmd),
    Unpublish(UnpublishCmd),
    Pool(PoolCmd),
    Db(DbCmd),
}

#[derive(FromArgs, PartialEq, Debug)]
/// sync one configured repository (or every enabled repository if --repo is
/// omitted)
#[argh(subcommand, name = "sync")]
pub(crate) struct SyncCmd {
    /// repository id from the config; all enabled repositories if omitted
    #[argh(option, short = 'r')]
    pub repo: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// dry-run a sync: report what would change without downloading or
/// mutating the catalog
#[argh(subcommand, name = "check-updates")]
pub(crate) struct CheckUpdatesCmd {
    /// repository id from the config; all enabled repositories if omitted
    #[argh(option, short = 'r')]
    pub repo: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// snapshot management (§4.7)
#[argh(subcommand, name = "snapshot")]
pub(crate) struct SnapshotCmd {
    #[argh(subcommand)]
    pub action: SnapshotAction,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum SnapshotAction {
    Create(SnapshotCreate),
    List(SnapshotList),
    Copy(SnapshotCopy),
    Delete(SnapshotDelete),
    Diff(SnapshotDiffCmd),
}

#[derive(FromArgs, PartialEq, Debug)]
/// create a new snapshot of a repository's current state
#[argh(subcommand, name = "create")]
pub(crate) struct SnapshotCreate {
    /// repository id
    #[argh(option, short = 'r')]
    pub repo: String,
    /// snapshot name, unique per repository
    #[argh(option, short = 'n')]
    pub name: String,
    /// optional human-readable description
    #[argh(option, short = 'd')]
    pub description: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// list a repository's snapshots
#[argh(subcommand, name = "list")]
pub(crate) struct SnapshotList {
    /// repository id
    #[argh(option, short = 'r')]
    pub repo: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// copy-on-name: create a new snapshot row sharing the source's content
#[argh(subcommand, name = "copy")]
pub(crate) struct SnapshotCopy {
    /// source snapshot id
    #[argh(option)]
    pub source: i64,
    /// name for the new snapshot
    #[argh(option)]
    pub target_name: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// delete a snapshot; refuses published snapshots unless --force
#[argh(subcommand, name = "delete")]
pub(crate) struct SnapshotDelete {
    /// snapshot id
    #[argh(option)]
    pub id: i64,
    /// remove a published snapshot anyway, deleting its published directory
    #[argh(switch)]
    pub force: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// diff two snapshots' package membership (§4.7 scenario 5)
#[argh(subcommand, name = "diff")]
pub(crate) struct SnapshotDiffCmd {
    /// earlier snapshot id
    #[argh(option)]
    pub a: i64,
    /// later snapshot id
    #[argh(option)]
    pub b: i64,
}

#[derive(FromArgs, PartialEq, Debug)]
/// create a consistent set of per-repository snapshots for a view
#[argh(subcommand, name = "view-snapshot")]
pub(crate) struct ViewSnapshotCmd {
    /// view id from the config
    #[argh(option)]
    pub view: String,
    /// name shared by the generated member snapshots
    #[argh(option)]
    pub name: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// materialize a repository, snapshot, or view onto a target directory
/// (§4.8)
#[argh(subcommand, name = "publish")]
pub(crate) struct PublishCmd {
    #[argh(subcommand)]
    pub target: PublishTarget,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum PublishTarget {
    Repository(PublishRepository),
    Snapshot(PublishSnapshot),
    View(PublishView),
    ViewSnapshot(PublishViewSnapshot),
}

#[derive(FromArgs, PartialEq, Debug)]
/// publish a repository's current (unsnapshotted) catalog state
#[argh(subcommand, name = "repository")]
pub(crate) struct PublishRepository {
    /// repository id
    #[argh(option, short = 'r')]
    pub repo: String,
    /// output directory
    #[argh(option, short = 't')]
    pub target: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// publish a frozen snapshot
#[argh(subcommand, name = "snapshot")]
pub(crate) struct PublishSnapshot {
    /// snapshot id
    #[argh(option)]
    pub id: i64,
    /// output directory
    #[argh(option, short = 't')]
    pub target: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// publish a view from its members' current catalog state
#[argh(subcommand, name = "view")]
pub(crate) struct PublishView {
    /// view id
    #[argh(option)]
    pub view: String,
    /// output directory
    #[argh(option, short = 't')]
    pub target: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// publish a view from a previously captured view-snapshot
#[argh(subcommand, name = "view-snapshot")]
pub(crate) struct PublishViewSnapshot {
    /// view id
    #[argh(option)]
    pub view: String,
    /// view-snapshot id, as printed by `snapshot view-snapshot`
    #[argh(option)]
    pub view_snapshot: i64,
    /// output directory
    #[argh(option, short = 't')]
    pub target: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// recursively remove a published target directory (§4.8.6)
#[argh(subcommand, name = "unpublish")]
pub(crate) struct UnpublishCmd {
    /// directory to remove
    #[argh(option, short = 't')]
    pub target: String,
    /// snapshot id to mark unpublished, if the target backed one
    #[argh(option)]
    pub snapshot: Option<i64>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// pool integrity and garbage collection (§4.9)
#[argh(subcommand, name = "pool")]
pub(crate) struct PoolCmd {
    #[argh(subcommand)]
    pub action: PoolAction,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum PoolAction {
    Verify(PoolVerify),
    Orphaned(PoolOrphaned),
    Missing(PoolMissing),
    Cleanup(PoolCleanup),
}

#[derive(FromArgs, PartialEq, Debug)]
/// recompute checksums for every catalog row and compare against the pool
#[argh(subcommand, name = "verify")]
pub(crate) struct PoolVerify {}

#[derive(FromArgs, PartialEq, Debug)]
/// list pool files referenced by no catalog row
#[argh(subcommand, name = "orphaned")]
pub(crate) struct PoolOrphaned {}

#[derive(FromArgs, PartialEq, Debug)]
/// list catalog rows whose pool file does not exist
#[argh(subcommand, name = "missing")]
pub(crate) struct PoolMissing {}

#[derive(FromArgs, PartialEq, Debug)]
/// delete orphaned pool files and/or catalog rows with a missing payload
#[argh(subcommand, name = "cleanup")]
pub(crate) struct PoolCleanup {
    /// remove orphaned pool files
    #[argh(switch)]
    pub orphaned: bool,
    /// remove catalog rows whose payload is missing
    #[argh(switch)]
    pub missing: bool,
    /// report what would be deleted without deleting anything
    #[argh(switch)]
    pub dry_run: bool,
    /// skip the confirmation prompt
    #[argh(switch)]
    pub force: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// configuration/catalog reconciliation (§4.9 `db orphaned`/`db cleanup`)
#[argh(subcommand, name = "db")]
pub(crate) struct DbCmd {
    #[argh(subcommand)]
    pub action: DbAction,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum DbAction {
    Orphaned(DbOrphaned),
    Cleanup(DbCleanup),
}

#[derive(FromArgs, PartialEq, Debug)]
/// list repositories present in the catalog but absent from the config
#[argh(subcommand, name = "orphaned")]
pub(crate) struct DbOrphaned {}

#[derive(FromArgs, PartialEq, Debug)]
/// delete repositories present in the catalog but absent from the config
#[argh(subcommand, name = "cleanup")]
pub(crate) struct DbCleanup {
    /// skip the confirmation prompt
    #[argh(switch)]
    pub force: bool,
}

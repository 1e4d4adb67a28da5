use tallyup_core::GroupId;

/// A command targets exactly one group ledger.
///
/// Commands represent intent ("record this expense"); they are transient and turn
/// into events once accepted. One group is one transaction boundary: a command
/// never touches two groups.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_group_id(&self) -> GroupId;
}

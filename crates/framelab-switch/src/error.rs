/// Errors in an interface specification argument.
///
/// `arg` is the 1-based position of the offending argument, which is also
/// the interface index it would have been assigned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("interface {arg}: empty interface name")]
    EmptyName { arg: usize },

    #[error("interface {arg}: '[' without matching ']'")]
    MissingCloseBracket { arg: usize },

    #[error("interface {arg}: unexpected characters '{rest}' after ']'")]
    TrailingCharacters { arg: usize, rest: String },

    #[error("interface {arg}: unknown VLAN mode '{mode}' (expected 'T' or 'U')")]
    UnknownMode { arg: usize, mode: String },

    #[error("interface {arg}: expected ':' after the VLAN mode")]
    MissingColon { arg: usize },

    #[error("interface {arg}: '{token}' is not a VLAN number")]
    NotANumber { arg: usize, token: String },

    #[error("interface {arg}: VLAN {vlan} out of range ({min}-{max})")]
    VlanOutOfRange {
        arg: usize,
        vlan: u32,
        min: u16,
        max: u16,
    },

    #[error("interface {arg}: tagged interface lists no VLANs")]
    EmptyVlanList { arg: usize },

    #[error("interface {arg}: VLAN {vlan} listed twice")]
    DuplicateVlan { arg: usize, vlan: u16 },

    #[error("{count} interfaces configured, at most {max} are supported")]
    TooManyInterfaces { count: usize, max: usize },
}

use crate::core::{errors::TwitterResult, params::Parameters};

/// Conversion of a typed parameter struct into the ordered wire parameter list.
///
/// Implementors insert fields in declaration order and skip `None` fields, so
/// reserved path keys can be taken out deterministically afterwards.
pub trait ToParameters {
    fn to_parameters(&self) -> TwitterResult<Parameters>;
}

/// Enumerations sent by their symbolic name
pub trait ParamEnum {
    /// Symbolic name; rendered lower-cased on the wire
    fn name(&self) -> &'static str;
}

/// Bit-flag sets sent as a comma-joined list of active flag names
pub trait ParamFlags: Sized + 'static {
    /// All flags with their names, in declaration order
    fn all() -> &'static [(Self, &'static str)];

    fn contains(&self, flag: &Self) -> bool;

    /// Names of the active flags, in declaration order
    fn active_names(&self) -> Vec<&'static str> {
        Self::all()
            .iter()
            .filter(|(flag, _)| self.contains(flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

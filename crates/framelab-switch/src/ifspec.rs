//! Interface specification grammar.
//!
//! ```text
//! NAME                  untagged, native VLAN 0
//! NAME[U:v]             untagged member of VLAN v
//! NAME[T:v1,v2,...]     tagged trunk carrying VLANs v1, v2, ...
//! ```

use std::fmt;

use framelab_proto::MAX_INTERFACES;
use serde::Serialize;

use crate::error::SpecError;

/// Lowest VLAN id accepted in a specification.
pub const MIN_VLAN: u16 = 1;

/// Highest VLAN id accepted in a specification.
pub const MAX_VLAN: u16 = 4092;

/// Native VLAN of an interface given without brackets.
pub const DEFAULT_VLAN: u16 = 0;

/// How an interface participates in VLANs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VlanMode {
    /// Trunk port. Frames leave tagged; the first VLAN is the one untagged
    /// traffic is tagged into.
    Tagged(Vec<u16>),
    /// Access port on a single native VLAN.
    Untagged(u16),
}

impl VlanMode {
    /// Whether this interface carries `vlan`.
    pub fn carries(&self, vlan: u16) -> bool {
        match self {
            Self::Tagged(vlans) => vlans.contains(&vlan),
            Self::Untagged(native) => *native == vlan,
        }
    }
}

/// One configured interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceSpec {
    /// 1-based interface index, equal to the argument position.
    pub index: u16,
    pub name: String,
    pub mode: VlanMode,
}

impl InterfaceSpec {
    /// An untagged interface on the default VLAN.
    pub fn plain(index: u16, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            mode: VlanMode::Untagged(DEFAULT_VLAN),
        }
    }
}

impl fmt::Display for InterfaceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        match &self.mode {
            VlanMode::Untagged(DEFAULT_VLAN) => Ok(()),
            VlanMode::Untagged(vlan) => write!(f, "[U:{vlan}]"),
            VlanMode::Tagged(vlans) => {
                f.write_str("[T:")?;
                for (i, vlan) in vlans.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{vlan}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Parse all interface arguments, assigning indices by position.
///
/// Either every argument parses or the first error is returned.
pub fn parse_interfaces<I, S>(args: I) -> Result<Vec<InterfaceSpec>, SpecError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<S> = args.into_iter().collect();
    checked_interface_count(args.len())?;
    args.iter()
        .enumerate()
        .map(|(i, arg)| parse_interface(arg.as_ref(), i + 1))
        .collect()
}

/// `count` as a roster-sized interface count.
pub fn checked_interface_count(count: usize) -> Result<u16, SpecError> {
    if count > MAX_INTERFACES {
        return Err(SpecError::TooManyInterfaces {
            count,
            max: MAX_INTERFACES,
        });
    }
    u16::try_from(count).map_err(|_| SpecError::TooManyInterfaces {
        count,
        max: MAX_INTERFACES,
    })
}

/// Parse the interface argument at 1-based position `arg`.
pub fn parse_interface(spec: &str, arg: usize) -> Result<InterfaceSpec, SpecError> {
    let index = u16::try_from(arg).map_err(|_| SpecError::TooManyInterfaces {
        count: arg,
        max: MAX_INTERFACES,
    })?;

    let Some(open) = spec.find('[') else {
        if spec.is_empty() {
            return Err(SpecError::EmptyName { arg });
        }
        return Ok(InterfaceSpec::plain(index, spec));
    };

    let name = &spec[..open];
    if name.is_empty() {
        return Err(SpecError::EmptyName { arg });
    }
    let body = &spec[open + 1..];
    let close = body
        .find(']')
        .ok_or(SpecError::MissingCloseBracket { arg })?;
    let rest = &body[close + 1..];
    if !rest.is_empty() {
        return Err(SpecError::TrailingCharacters {
            arg,
            rest: rest.to_string(),
        });
    }

    let inner = &body[..close];
    let mut chars = inner.chars();
    let mode = match chars.next() {
        Some('T') => VlanMode::Tagged(parse_vlan_list(chars.as_str(), arg)?),
        Some('U') => {
            let value = chars
                .as_str()
                .strip_prefix(':')
                .ok_or(SpecError::MissingColon { arg })?;
            VlanMode::Untagged(parse_vlan(value, arg)?)
        }
        other => {
            return Err(SpecError::UnknownMode {
                arg,
                mode: other.map(String::from).unwrap_or_default(),
            })
        }
    };

    Ok(InterfaceSpec {
        index,
        name: name.to_string(),
        mode,
    })
}

fn parse_vlan_list(list: &str, arg: usize) -> Result<Vec<u16>, SpecError> {
    let list = list.strip_prefix(':').ok_or(SpecError::MissingColon { arg })?;
    if list.is_empty() {
        return Err(SpecError::EmptyVlanList { arg });
    }
    let mut vlans = Vec::new();
    for token in list.split(',') {
        let vlan = parse_vlan(token, arg)?;
        if vlans.contains(&vlan) {
            return Err(SpecError::DuplicateVlan { arg, vlan });
        }
        vlans.push(vlan);
    }
    Ok(vlans)
}

fn parse_vlan(token: &str, arg: usize) -> Result<u16, SpecError> {
    let vlan: u32 = token.parse().map_err(|_| SpecError::NotANumber {
        arg,
        token: token.to_string(),
    })?;
    if !(u32::from(MIN_VLAN)..=u32::from(MAX_VLAN)).contains(&vlan) {
        return Err(SpecError::VlanOutOfRange {
            arg,
            vlan,
            min: MIN_VLAN,
            max: MAX_VLAN,
        });
    }
    Ok(vlan as u16)
}

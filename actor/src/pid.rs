//! Process identifiers.

use std::fmt;

/// Identifies a process within an actor system.
///
/// A `Pid` is stable for the lifetime of the process it references and is
/// compared by value. Child processes append their segment to the parent's
/// id with `/`, so the id doubles as the process path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pid {
    pub address: String,
    pub id: String,
}

impl Pid {
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            id: id.into(),
        }
    }

    /// Full process path, e.g. `actor://local/gate/agents/$3`.
    pub fn path(&self) -> String {
        format!("actor://{}/{}", self.address, self.id)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor://{}/{}", self.address, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_path_form() {
        let pid = Pid::new("local", "gate/agents/$3");
        assert_eq!(pid.path(), "actor://local/gate/agents/$3");
        assert_eq!(pid.to_string(), pid.path());
    }

    #[test]
    fn pids_compare_by_value() {
        let a = Pid::new("local", "$1");
        let b = Pid::new("local", "$1");
        let c = Pid::new("local", "$2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

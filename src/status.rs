use std::fmt;

/// Health of a single monitored target.
///
/// Owned by exactly one worker. Transitions return the new value instead of
/// mutating in place, and every transition is valid from every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Never checked yet.
    #[default]
    Initial,
    Ok,
    Alert,
    Unknown,
}

impl Status {
    pub fn recovery(self) -> Self {
        Status::Ok
    }

    pub fn trigger(self) -> Self {
        Status::Alert
    }

    pub fn unknown(self) -> Self {
        Status::Unknown
    }

    pub fn is(self, other: Status) -> bool {
        self == other
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Initial => "Initial",
            Status::Ok => "OK",
            Status::Alert => "Alert",
            Status::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

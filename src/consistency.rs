/// Read consistency level, passed as the `level` query parameter.
///
/// `None` may be served from a stale follower; `Weak` checks leadership
/// before reading; `Linearizable` and `Strong` force a leader round-trip
/// through the consensus log.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Consistency {
    None,
    #[default]
    Weak,
    Linearizable,
    Strong,
}

impl Consistency {
    /// Wire name of the level.
    pub fn as_param(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Weak => "weak",
            Self::Linearizable => "linearizable",
            Self::Strong => "strong",
        }
    }

}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_param())
    }
}

#[cfg(test)]
mod tests {
    use super::Consistency;

    #[test]
    fn wire_names() {
        assert_eq!(Consistency::None.as_param(), "none");
        assert_eq!(Consistency::Weak.as_param(), "weak");
        assert_eq!(Consistency::Linearizable.as_param(), "linearizable");
        assert_eq!(Consistency::Strong.as_param(), "strong");
    }

    #[test]
    fn default_is_weak() {
        assert_eq!(Consistency::default(), Consistency::Weak);
    }
}

use crate::ConfigError;

/// Names the inventory group (e.g. an autoscaling group) whose members
/// become upstreams.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryGroup {
    /// The provider-side identifier of the group.
    identifier: String,
}

impl InventoryGroup {
    /// Create an [`InventoryGroup`] from a non-empty identifier.
    ///
    /// Surrounding whitespace is trimmed; an identifier that is empty after
    /// trimming is rejected.
    pub fn new<T: ToString>(identifier: T) -> Result<Self, ConfigError> {
        let identifier = identifier.to_string().trim().to_string();

        if identifier.is_empty() {
            return Err(ConfigError::EmptyGroupIdentifier);
        }

        Ok(Self { identifier })
    }

    /// Get the identifier of the group.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl std::fmt::Display for InventoryGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.identifier)
    }
}

/// ```
/// let group = asg_upstreams::InventoryGroup::try_from("web-asg").unwrap();
/// assert_eq!(group.identifier(), "web-asg");
/// ```
impl TryFrom<&str> for InventoryGroup {
    type Error = ConfigError;

    fn try_from(identifier: &str) -> Result<Self, Self::Error> {
        Self::new(identifier)
    }
}

/// ```
/// let group = asg_upstreams::InventoryGroup::try_from(String::from("web-asg")).unwrap();
/// assert_eq!(group.identifier(), "web-asg");
/// ```
impl TryFrom<String> for InventoryGroup {
    type Error = ConfigError;

    fn try_from(identifier: String) -> Result<Self, Self::Error> {
        Self::new(identifier)
    }
}

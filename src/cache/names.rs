/// Names of the three current-generation partitions.
///
/// Every partition this application creates is named `<prefix>-...`; anything
/// with that prefix that is not current is a stale generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  prefix: String,
  pub shell: String,
  pub images: String,
  pub runtime: String,
}

impl CacheNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    Self {
      prefix: prefix.to_string(),
      shell: format!("{prefix}-shell-{version}"),
      images: format!("{prefix}-images-{version}"),
      runtime: format!("{prefix}-runtime-{version}"),
    }
  }

  pub fn current(&self) -> [&str; 3] {
    [&self.shell, &self.images, &self.runtime]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current().iter().any(|current| *current == name)
  }

  /// Ours, but not one of the current generation.
  pub fn is_stale(&self, name: &str) -> bool {
    let owned = name
      .strip_prefix(self.prefix.as_str())
      .is_some_and(|rest| rest.starts_with('-'));
    owned && !self.is_current(name)
  }
}

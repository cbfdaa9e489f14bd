use crate::config::FreshnessConfig;

/// Textual signals that decide whether the day's comic is on a fetched page.
///
/// Available only when at least one positive marker is present and no
/// negative marker is. Anything else counts as not published yet.
#[derive(Debug, Clone)]
pub struct ComicSignals {
  positive: Vec<String>,
  negative: Vec<String>,
}

impl ComicSignals {
  pub fn new(positive: &[String], negative: &[String]) -> Self {
    let lower = |markers: &[String]| -> Vec<String> {
      markers
        .iter()
        .filter(|m| !m.trim().is_empty())
        .map(|m| m.to_lowercase())
        .collect()
    };
    Self {
      positive: lower(positive),
      negative: lower(negative),
    }
  }

  pub fn from_config(config: &FreshnessConfig) -> Self {
    Self::new(&config.positive_markers, &config.negative_markers)
  }

  pub fn is_available(&self, page: &str) -> bool {
    let page = page.to_lowercase();
    let has_comic = self.positive.iter().any(|m| page.contains(m.as_str()));
    let placeholder = self.negative.iter().any(|m| page.contains(m.as_str()));
    has_comic && !placeholder
  }
}

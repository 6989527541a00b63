use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// How table boundaries are found on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Cells delimited by visible rules or explicit separators.
    #[default]
    Lattice,
    /// Cells inferred from whitespace alignment.
    Stream,
}

impl DetectionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lattice => "lattice",
            Self::Stream => "stream",
        }
    }
}

impl Display for DetectionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lattice" => Ok(Self::Lattice),
            "stream" => Ok(Self::Stream),
            other => Err(format!(
                "unknown detection mode '{other}', expected lattice or stream"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    #[serde(rename = "auto")]
    AutoDetect,
    #[serde(rename = "first_row")]
    HasHeader,
    #[default]
    #[serde(rename = "none")]
    NoHeader,
}

impl FromStr for HeaderMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::AutoDetect),
            "first_row" | "first-row" => Ok(Self::HasHeader),
            "none" => Ok(Self::NoHeader),
            other => Err(format!(
                "unknown header mode '{other}', expected auto, first_row or none"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    #[default]
    BestEffort,
    Strict,
    SkipAmbiguous,
}

impl QualityMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best_effort",
            Self::Strict => "strict",
            Self::SkipAmbiguous => "skip_ambiguous",
        }
    }
}

impl FromStr for QualityMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            "skip_ambiguous" => Ok(Self::SkipAmbiguous),
            other => Err(format!(
                "unknown quality mode '{other}', expected best_effort, strict or skip_ambiguous"
            )),
        }
    }
}

/// A validated, de-duplicated set of 1-based page numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    /// Parses `spec` and checks every page against `total_pages`.
    ///
    /// The keyword `all` selects the whole document.
    pub fn parse(spec: &str, total_pages: u32) -> Result<Self, ExtractError> {
        if spec.trim().eq_ignore_ascii_case("all") {
            return Self::all(total_pages);
        }

        let pages = select_pages(spec, total_pages).map_err(ExtractError::InvalidPageRange)?;
        Ok(Self { pages })
    }

    pub fn all(total_pages: u32) -> Result<Self, ExtractError> {
        if total_pages == 0 {
            return Err(ExtractError::InvalidPageRange(
                "document has no pages".to_string(),
            ));
        }
        Ok(Self {
            pages: (1..=total_pages).collect(),
        })
    }

    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Pages in ascending order.
    #[must_use]
    pub fn pages(&self) -> Vec<u32> {
        self.pages.iter().copied().collect()
    }
}

/// Expands `spec` into page numbers, bounding every token by `total_pages`
/// before it is expanded.
fn select_pages(spec: &str, total_pages: u32) -> Result<BTreeSet<u32>, String> {
    let beyond = |page: u32| format!("page {page} is beyond the last page ({total_pages})");

    let mut pages = BTreeSet::new();
    for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = token.split_once('-') {
            let start: u32 = start
                .trim()
                .parse()
                .map_err(|_| format!("invalid page range start: '{start}'"))?;
            let end: u32 = end
                .trim()
                .parse()
                .map_err(|_| format!("invalid page range end: '{end}'"))?;
            if start == 0 || end == 0 {
                return Err("pages are 1-based".to_string());
            }
            if end < start {
                return Err(format!(
                    "invalid range '{token}': end is smaller than start"
                ));
            }
            if end > total_pages {
                return Err(beyond(end));
            }
            pages.extend(start..=end);
        } else {
            let page: u32 = token
                .parse()
                .map_err(|_| format!("invalid page number: '{token}'"))?;
            if page == 0 {
                return Err("pages are 1-based".to_string());
            }
            if page > total_pages {
                return Err(beyond(page));
            }
            pages.insert(page);
        }
    }

    if pages.is_empty() {
        return Err("page selection cannot be empty".to_string());
    }

    Ok(pages)
}

/// Everything one extraction call needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub pages: String,
    pub mode: DetectionMode,
    pub quality: QualityMode,
    pub header_mode: HeaderMode,
    pub min_rows: usize,
    pub min_cols: usize,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            pages: "1".to_string(),
            mode: DetectionMode::Lattice,
            quality: QualityMode::BestEffort,
            header_mode: HeaderMode::NoHeader,
            min_rows: 1,
            min_cols: 2,
        }
    }
}

impl ExtractionSettings {
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.min_cols < 2 {
            return Err(ExtractError::InvalidOption(
                "min_cols must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DetectionMode, ExtractionSettings, PageSelection};
    use crate::ExtractError;
    use std::time::{Duration, Instant};

    #[test]
    fn parse_page_selection_range_and_single() {
        let selection = PageSelection::parse("1,3-5,7", 10).expect("selection should parse");
        assert_eq!(selection.pages(), vec![1, 3, 4, 5, 7]);
        assert!(!selection.contains(2));
    }

    #[test]
    fn tolerates_whitespace_and_empty_tokens() {
        let selection = PageSelection::parse(" 2 , ,4- 5,", 5).expect("selection should parse");
        assert_eq!(selection.pages(), vec![2, 4, 5]);
    }

    #[test]
    fn reject_invalid_page_selection() {
        for spec in ["3-1", "x", "99", "0", "", "1-y"] {
            let err = PageSelection::parse(spec, 10).expect_err("selection should fail");
            assert!(
                matches!(err, ExtractError::InvalidPageRange(_)),
                "{spec}: {err:?}"
            );
        }
    }

    #[test]
    fn reversed_range_message_names_the_token() {
        let err = PageSelection::parse("3-1", 10).expect_err("invalid range should fail");
        assert!(err.to_string().contains("invalid range '3-1'"));
    }

    #[test]
    fn huge_range_is_rejected_without_expanding() {
        let started = Instant::now();
        let err = PageSelection::parse("1-4294967295", 10).expect_err("range is out of bounds");
        assert!(
            matches!(&err, ExtractError::InvalidPageRange(message) if message.contains("4294967295")),
            "{err:?}"
        );
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn all_keyword_selects_every_page() {
        let selection = PageSelection::parse("ALL", 3).expect("all should parse");
        assert_eq!(selection.pages(), vec![1, 2, 3]);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: ExtractionSettings =
            serde_json::from_str(r#"{"pages":"2-3","mode":"stream"}"#).expect("settings");
        assert_eq!(settings.mode, DetectionMode::Stream);
        assert_eq!(settings.min_rows, 1);
        assert_eq!(settings.pages, "2-3");
    }

    #[test]
    fn rejects_single_column_minimum() {
        let settings = ExtractionSettings {
            min_cols: 1,
            ..ExtractionSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}

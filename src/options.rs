use std::collections::BTreeSet;
use std::str::FromStr;

pub(crate) const DEFAULT_Y_TOLERANCE: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
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
                pages.extend(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                pages.insert(page);
            }
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self { pages })
    }
}

/// Shape and colour limits for a grey banner drawn in place of a text title.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaderImageTolerance {
    /// Minimum drawing width as a fraction of the page width (exclusive).
    pub min_width_ratio: f32,
    /// Height band, both ends exclusive.
    pub min_height: f32,
    pub max_height: f32,
    pub fill: [f32; 3],
    /// Relative tolerance per colour channel.
    pub fill_rtol: f32,
    /// Absolute tolerance per colour channel.
    pub fill_atol: f32,
}

impl HeaderImageTolerance {
    #[must_use]
    pub fn fill_matches(&self, fill: [f32; 3]) -> bool {
        fill.iter()
            .zip(self.fill)
            .all(|(actual, expected)| {
                (actual - expected).abs() <= self.fill_atol + self.fill_rtol * expected.abs()
            })
    }
}

impl Default for HeaderImageTolerance {
    fn default() -> Self {
        Self {
            min_width_ratio: 0.8,
            min_height: 10.0,
            max_height: 50.0,
            fill: [0.72, 0.72, 0.72],
            fill_rtol: 0.1,
            fill_atol: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    /// Words whose vertical centres differ by at most this share a line.
    pub y_tolerance: f32,
    pub header_image: HeaderImageTolerance,
    pub delimiter: u8,
}

impl ExtractOptions {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(self.y_tolerance.is_finite() && self.y_tolerance > 0.0) {
            return Err("y_tolerance must be a positive number".to_string());
        }
        let image = &self.header_image;
        if image.min_height >= image.max_height {
            return Err("header image height band is empty".to_string());
        }
        if !(0.0..=1.0).contains(&image.min_width_ratio) {
            return Err("header image width ratio must be within 0..=1".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            y_tolerance: DEFAULT_Y_TOLERANCE,
            header_image: HeaderImageTolerance::default(),
            delimiter: b',',
        }
    }
}

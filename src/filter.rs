//! Location and title filtering applied to scraped jobs before the
//! expensive detail-fetch and persistence phases.

use serde::Serialize;

/// Curated per-country alias tables: the country's own names plus major
/// hiring hubs. Matching is word-boundary anchored so short aliases do
/// not fire inside unrelated words ("IN" vs "engineering").
const COUNTRY_ALIASES: &[(&str, &[&str])] = &[
    (
        "india",
        &[
            "india", "IN", "bangalore", "bengaluru", "mumbai", "pune", "hyderabad", "chennai",
            "delhi", "gurgaon", "gurugram", "noida", "kolkata", "ahmedabad", "jaipur", "kochi",
            "thiruvananthapuram", "indore", "chandigarh",
        ],
    ),
    (
        "united states",
        &[
            "united states", "usa", "US", "U.S.", "new york", "san francisco", "seattle",
            "austin", "boston", "chicago", "los angeles", "denver", "atlanta", "washington",
            "portland", "san jose", "san diego", "dallas", "miami",
        ],
    ),
    (
        "united kingdom",
        &[
            "united kingdom", "UK", "england", "scotland", "london", "manchester", "edinburgh",
            "cambridge", "bristol", "leeds", "glasgow", "birmingham",
        ],
    ),
    (
        "germany",
        &[
            "germany", "deutschland", "DE", "berlin", "munich", "münchen", "hamburg",
            "frankfurt", "cologne", "köln", "stuttgart", "düsseldorf", "leipzig",
        ],
    ),
    (
        "netherlands",
        &[
            "netherlands", "NL", "amsterdam", "rotterdam", "utrecht", "eindhoven", "the hague",
        ],
    ),
    (
        "canada",
        &[
            "canada", "CA", "toronto", "vancouver", "montreal", "ottawa", "calgary", "waterloo",
        ],
    ),
    (
        "australia",
        &[
            "australia", "AU", "sydney", "melbourne", "brisbane", "perth", "canberra",
        ],
    ),
    (
        "france",
        &["france", "FR", "paris", "lyon", "toulouse", "nantes", "bordeaux"],
    ),
    (
        "spain",
        &["spain", "ES", "madrid", "barcelona", "valencia", "seville", "malaga"],
    ),
    (
        "poland",
        &["poland", "PL", "warsaw", "krakow", "kraków", "wroclaw", "wrocław", "gdansk", "poznan"],
    ),
];

/// Location strings that pass the country filter unconditionally.
const REMOTE_MARKERS: &[&str] = &["remote", "worldwide", "anywhere", "global", "work from home"];

/// User-configured inclusion rules. Each field is independently
/// toggleable; `None`/empty means that rule is off.
#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub country: Option<String>,
    pub city: Option<String>,
    pub title_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Country,
    City,
    TitleKeyword,
}

/// Per-rule rejection counters, reported separately for observability.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FilterCounts {
    pub by_country: i32,
    pub by_city: i32,
    pub by_keyword: i32,
}

impl FilterCounts {
    pub fn record(&mut self, reason: FilterReason) {
        match reason {
            FilterReason::Country => self.by_country += 1,
            FilterReason::City => self.by_city += 1,
            FilterReason::TitleKeyword => self.by_keyword += 1,
        }
    }

    pub fn total(&self) -> i32 {
        self.by_country + self.by_city + self.by_keyword
    }
}

impl JobFilters {
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.city.is_none() && self.title_keywords.is_empty()
    }

    /// Apply the rules in order: country, city, title keywords. Returns
    /// the first rule that rejects the job, or `None` if it survives.
    pub fn evaluate(&self, title: &str, location: &str) -> Option<FilterReason> {
        if let Some(country) = &self.country
            && !location_matches_country(location, country)
        {
            return Some(FilterReason::Country);
        }

        if let Some(city) = &self.city
            && !is_remote_location(location)
            && !contains_ci(location, city)
        {
            return Some(FilterReason::City);
        }

        if !self.title_keywords.is_empty()
            && !self
                .title_keywords
                .iter()
                .any(|kw| contains_ci(title, kw))
        {
            return Some(FilterReason::TitleKeyword);
        }

        None
    }
}

pub fn is_remote_location(location: &str) -> bool {
    let lower = location.to_lowercase();
    REMOTE_MARKERS.iter().any(|m| lower.contains(m))
}

fn location_matches_country(location: &str, country: &str) -> bool {
    if location.trim().is_empty() || is_remote_location(location) {
        return true;
    }

    let wanted = country.trim().to_lowercase();
    let aliases = COUNTRY_ALIASES
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, aliases)| *aliases);

    match aliases {
        Some(aliases) => aliases.iter().any(|alias| contains_word(location, alias)),
        // Unknown country: fall back to matching the name itself.
        None => contains_word(location, &wanted),
    }
}

/// Case-insensitive substring test.
fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Case-insensitive substring test anchored at word boundaries.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }

    let mut start = 0;
    while let Some(pos) = haystack[start..].find(&needle) {
        let begin = start + pos;
        let end = begin + needle.len();
        let before_ok = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = begin + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn india_filter() -> JobFilters {
        JobFilters {
            country: Some("India".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn remote_passes_country_filter() {
        let f = india_filter();
        assert_eq!(f.evaluate("Engineer", "Remote"), None);
        assert_eq!(f.evaluate("Engineer", "Worldwide"), None);
        assert_eq!(f.evaluate("Engineer", "Anywhere (EMEA)"), None);
    }

    #[test]
    fn city_alias_matches_country() {
        let f = india_filter();
        assert_eq!(f.evaluate("Engineer", "Bengaluru, Karnataka"), None);
        assert_eq!(f.evaluate("Engineer", "Pune"), None);
        assert_eq!(
            f.evaluate("Engineer", "Berlin, Germany"),
            Some(FilterReason::Country)
        );
    }

    #[test]
    fn short_alias_needs_word_boundary() {
        // "IN" must not fire inside "engineering".
        assert!(!contains_word("Engineering Office, Berlin", "in"));
        assert!(contains_word("Indianapolis, IN", "in"));
        assert!(contains_word("Mumbai, India", "india"));
    }

    #[test]
    fn city_filter_is_substring() {
        let f = JobFilters {
            city: Some("bangalore".to_string()),
            ..Default::default()
        };
        assert_eq!(f.evaluate("Engineer", "Bangalore, India"), None);
        assert_eq!(
            f.evaluate("Engineer", "Mumbai, India"),
            Some(FilterReason::City)
        );
        // Remote escapes the city rule too.
        assert_eq!(f.evaluate("Engineer", "Remote - India"), None);
    }

    #[test]
    fn keyword_filter_is_case_insensitive() {
        let f = JobFilters {
            title_keywords: vec!["rust".to_string(), "backend".to_string()],
            ..Default::default()
        };
        assert_eq!(f.evaluate("Senior Rust Engineer", "Remote"), None);
        assert_eq!(f.evaluate("Backend Developer", "Remote"), None);
        assert_eq!(
            f.evaluate("Product Designer", "Remote"),
            Some(FilterReason::TitleKeyword)
        );
    }

    #[test]
    fn empty_keyword_list_passes_everything() {
        let f = JobFilters::default();
        assert_eq!(f.evaluate("Anything", "Anywhere"), None);
        assert!(f.is_empty());
    }

    #[test]
    fn composed_filters_equal_intersection() {
        let country = JobFilters {
            country: Some("India".to_string()),
            ..Default::default()
        };
        let city = JobFilters {
            city: Some("pune".to_string()),
            ..Default::default()
        };
        let keywords = JobFilters {
            title_keywords: vec!["engineer".to_string()],
            ..Default::default()
        };
        let composed = JobFilters {
            country: country.country.clone(),
            city: city.city.clone(),
            title_keywords: keywords.title_keywords.clone(),
        };

        let jobs = [
            ("Software Engineer", "Pune, India"),
            ("Software Engineer", "Mumbai, India"),
            ("Product Manager", "Pune, India"),
            ("Software Engineer", "Berlin, Germany"),
            ("Data Engineer", "Remote"),
        ];

        for (title, location) in jobs {
            let independent = country.evaluate(title, location).is_none()
                && city.evaluate(title, location).is_none()
                && keywords.evaluate(title, location).is_none();
            let together = composed.evaluate(title, location).is_none();
            assert_eq!(independent, together, "mismatch for {title} / {location}");
        }
    }

    #[test]
    fn counts_track_reasons_separately() {
        let mut counts = FilterCounts::default();
        counts.record(FilterReason::Country);
        counts.record(FilterReason::Country);
        counts.record(FilterReason::TitleKeyword);
        assert_eq!(counts.by_country, 2);
        assert_eq!(counts.by_city, 0);
        assert_eq!(counts.by_keyword, 1);
        assert_eq!(counts.total(), 3);
    }
}

// src/classify.rs
//! Content classifier: decides whether a posting is worth mailing.
//!
//! A `KeywordClassifier` is compiled from a `ClassifierProfile` (three term
//! lists from config). The algorithm is fixed; profiles are data, so a new
//! search gets its own filter without touching code.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::Html;
use serde::Deserialize;

pub trait Classifier: Send + Sync {
    fn matches(&self, title: &str, body: &str) -> bool;
}

/// Term lists for one search profile.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ClassifierProfile {
    /// Search term this profile filters.
    pub term: String,
    /// Title must contain one of these as a whole word.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Any of these in the title disqualifies the posting.
    #[serde(default)]
    pub excluded_titles: Vec<String>,
    /// Plain-text body must mention one of these.
    #[serde(default)]
    pub required_skills: Vec<String>,
}

impl ClassifierProfile {
    /// Machine-learning profile used when no profile is configured.
    pub fn machine_learning() -> Self {
        Self {
            term: "machine learning".into(),
            keywords: vec!["data".into(), "machine learning".into()],
            excluded_titles: vec![
                "manager".into(),
                "principal".into(),
                "professor".into(),
                "director".into(),
                "lead".into(),
            ],
            required_skills: vec!["python".into()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    title_keyword: Option<Regex>,
    title_excluded: Option<Regex>,
    body_skill: Option<Regex>,
}

impl KeywordClassifier {
    pub fn new(profile: &ClassifierProfile) -> Result<Self, regex::Error> {
        Ok(Self {
            title_keyword: alternation(&profile.keywords, true)?,
            title_excluded: alternation(&profile.excluded_titles, true)?,
            body_skill: alternation(&profile.required_skills, false)?,
        })
    }

    pub fn title_has_keyword(&self, title: &str) -> bool {
        self.title_keyword.as_ref().is_some_and(|re| re.is_match(title))
    }

    pub fn title_has_excluded_seniority(&self, title: &str) -> bool {
        self.title_excluded.as_ref().is_some_and(|re| re.is_match(title))
    }

    pub fn body_has_required_skill(&self, text: &str) -> bool {
        self.body_skill.as_ref().is_some_and(|re| re.is_match(text))
    }
}

impl Classifier for KeywordClassifier {
    fn matches(&self, title: &str, body: &str) -> bool {
        // Cheap title checks first; the body strip is the expensive part.
        if !self.title_has_keyword(title) || self.title_has_excluded_seniority(title) {
            return false;
        }
        self.body_has_required_skill(&html_to_text(body))
    }
}

/// Accepts everything. Used for search terms without a profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Classifier for AcceptAll {
    fn matches(&self, _title: &str, _body: &str) -> bool {
        true
    }
}

/// Classifier per search term, with `AcceptAll` as the fallback.
#[derive(Clone)]
pub struct ClassifierSet {
    by_term: HashMap<String, Arc<dyn Classifier>>,
    fallback: Arc<dyn Classifier>,
}

impl Default for ClassifierSet {
    fn default() -> Self {
        Self {
            by_term: HashMap::new(),
            fallback: Arc::new(AcceptAll),
        }
    }
}

impl ClassifierSet {
    pub fn from_profiles(profiles: &[ClassifierProfile]) -> Result<Self, regex::Error> {
        let mut set = Self::default();
        for p in profiles {
            set = set.with(&p.term, Arc::new(KeywordClassifier::new(p)?));
        }
        Ok(set)
    }

    pub fn with(mut self, term: &str, classifier: Arc<dyn Classifier>) -> Self {
        self.by_term.insert(normalize_term(term), classifier);
        self
    }

    pub fn for_term(&self, term: &str) -> Arc<dyn Classifier> {
        self.by_term
            .get(&normalize_term(term))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }
}

fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// `(?i)\b(?:a|b)\b` for whole-word lists, `(?i)(?:a|b)` otherwise.
/// Empty list yields `None`, which never matches.
fn alternation(terms: &[String], whole_word: bool) -> Result<Option<Regex>, regex::Error> {
    let escaped: Vec<String> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if escaped.is_empty() {
        return Ok(None);
    }
    let body = escaped.join("|");
    let pattern = if whole_word {
        format!(r"(?i)\b(?:{body})\b")
    } else {
        format!(r"(?i)(?:{body})")
    };
    Regex::new(&pattern).map(Some)
}

const HIDDEN: [&str; 5] = ["head", "script", "style", "noscript", "template"];

/// Visible text of an HTML document. Text nodes are joined with spaces so
/// "<li>SQL</li><li>Python</li>" keeps its word break.
pub fn html_to_text(html: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let doc = Html::parse_document(html);
    let mut text = String::new();
    for node in doc.tree.root().descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN.contains(&e.name()))
        });
        if !hidden {
            text.push_str(t);
            text.push(' ');
        }
    }
    re_ws.replace_all(&text, " ").trim().to_string()
}

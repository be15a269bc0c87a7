// tests/classifier_table.rs
use top_of_the_pile::classify::{Classifier, ClassifierProfile, ClassifierSet, KeywordClassifier};

fn ml() -> KeywordClassifier {
    KeywordClassifier::new(&ClassifierProfile::machine_learning()).unwrap()
}

#[test]
fn truth_table() {
    let c = ml();
    // (title, body, expected)
    let cases = [
        // keyword, no exclusion, skill
        ("Data Scientist", "<p>We use Python daily</p>", true),
        ("Machine Learning Engineer", "<li>python, sql</li>", true),
        // no skill in body
        ("Data Scientist", "<p>Excel wizard wanted</p>", false),
        // excluded seniority
        ("Data Science Manager", "<p>Python</p>", false),
        ("Lead Data Engineer", "<p>Python</p>", false),
        ("Engineering Manager, Machine Learning", "<p>Python required</p>", false),
        // keyword present, no skill token anywhere
        ("Machine Learning Engineer", "<p>TensorFlow, Spark, Scala</p>", false),
        // excluded and no skill
        ("Director of Data", "<p>Spreadsheets</p>", false),
        // no keyword
        ("Software Engineer", "<p>Python</p>", false),
        ("Software Engineer", "<p>Java</p>", false),
    ];
    for (title, body, expected) in cases {
        assert_eq!(c.matches(title, body), expected, "{title} / {body}");
    }
}

#[test]
fn keywords_match_whole_words_only() {
    let c = ml();
    // "database" contains "data" but not as a word
    assert!(!c.matches("Database Administrator", "Python"));
    // "leadership" is not "lead"
    assert!(c.matches("Data Analyst (leadership track)", "Python"));
}

#[test]
fn skills_ignore_markup_and_scripts() {
    let c = ml();
    let body = r#"<html><head><script>var python = 1;</script></head>
        <body><div>Requirements: R &amp; SQL</div></body></html>"#;
    assert!(!c.matches("Data Scientist", body));
    assert!(c.matches("Data Scientist", "<div>Requirements: <b>PyThOn</b></div>"));
    // a stray "<" in prose is text, not the start of a tag
    assert!(c.matches("Data Scientist", "<p>Requirements: 3 < years; Python, SQL</p>"));
}

#[test]
fn empty_keyword_list_accepts_nothing() {
    let profile = ClassifierProfile {
        term: "anything".into(),
        required_skills: vec!["rust".into()],
        ..Default::default()
    };
    let c = KeywordClassifier::new(&profile).unwrap();
    assert!(!c.matches("Rust Engineer", "rust"));
}

#[test]
fn set_falls_back_to_accept_all() {
    let set = ClassifierSet::from_profiles(&[ClassifierProfile::machine_learning()]).unwrap();
    assert!(!set.for_term("Machine Learning ").matches("Barista", ""));
    assert!(set.for_term("barista").matches("Barista", ""));
}

// tests/filter_policy.rs
use contest_alerts::filter::{
    FilterPolicy, KeywordFilter, MatchMode, Rejection, ScoreThresholds, Verdict,
};
use contest_alerts::{CandidateItem, SourceDetails};

fn reddit_item(sub: &str, title: &str, body: &str, score: i64, url: &str) -> CandidateItem {
    CandidateItem {
        title: title.into(),
        body: body.into(),
        source_key: sub.into(),
        url: url.into(),
        engagement_score: Some(score),
        approval_ratio: Some(0.9),
        details: SourceDetails::Reddit {
            subreddit: sub.into(),
            score,
            comments: 0,
            is_self: !body.is_empty(),
            permalink: format!("/r/{sub}/comments/t1"),
        },
    }
}

fn policy() -> FilterPolicy {
    FilterPolicy {
        positive_terms: vec![
            "AI contest".into(),
            "hackathon".into(),
            "competition".into(),
        ],
        negative_terms: vec!["hiring".into()],
        score_thresholds: ScoreThresholds::new(50).with_source("AICompetitions", 50),
        ..FilterPolicy::default()
    }
}

#[test]
fn low_score_rejected_even_with_every_keyword() {
    let f = KeywordFilter::new(policy()).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "AI contest hackathon competition",
        "",
        10,
        "https://www.reddit.com/r/AICompetitions/comments/t1",
    );
    assert_eq!(
        f.evaluate(&item),
        Verdict::Rejected(Rejection::BelowScoreThreshold {
            score: 10,
            threshold: 50
        })
    );
}

#[test]
fn negative_term_vetoes_positive_match() {
    let f = KeywordFilter::new(policy()).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "AI hackathon hiring announcement",
        "",
        100,
        "https://www.reddit.com/r/AICompetitions/comments/t1",
    );
    assert_eq!(
        f.evaluate(&item),
        Verdict::Rejected(Rejection::NegativeTerm("hiring".into()))
    );
}

#[test]
fn negative_term_in_body_also_vetoes() {
    let f = KeywordFilter::new(policy()).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "Weekend hackathon",
        "Also: we are HIRING interns",
        100,
        "https://www.reddit.com/r/AICompetitions/comments/t1",
    );
    assert!(!f.accept(&item));
}

#[test]
fn unknown_source_falls_back_to_default_threshold() {
    let policy = FilterPolicy {
        score_thresholds: ScoreThresholds::new(50),
        ..policy()
    };
    let f = KeywordFilter::new(policy).unwrap();

    let passes = reddit_item(
        "UnknownSub",
        "Open AI contest",
        "",
        60,
        "https://www.reddit.com/r/UnknownSub/comments/t1",
    );
    assert!(f.accept(&passes));

    let fails = reddit_item(
        "UnknownSub",
        "Open AI contest",
        "",
        40,
        "https://www.reddit.com/r/UnknownSub/comments/t1",
    );
    assert!(matches!(
        f.evaluate(&fails),
        Verdict::Rejected(Rejection::BelowScoreThreshold { threshold: 50, .. })
    ));
}

#[test]
fn per_source_threshold_overrides_default() {
    let policy = FilterPolicy {
        score_thresholds: ScoreThresholds::new(50).with_source("AICompetitions", 5),
        ..policy()
    };
    let f = KeywordFilter::new(policy).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "Small AI contest",
        "",
        6,
        "https://www.reddit.com/r/AICompetitions/comments/t1",
    );
    assert!(f.accept(&item));
}

#[test]
fn media_url_rejected_after_keywords_match() {
    let f = KeywordFilter::new(policy()).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "My AI contest entry",
        "",
        100,
        "https://i.redd.it/entry.jpg",
    );
    assert_eq!(
        f.evaluate(&item),
        Verdict::Rejected(Rejection::MediaUrl(".jpg".into()))
    );

    // media check disabled
    let no_media = KeywordFilter::new(FilterPolicy {
        media_suffixes: vec![],
        ..policy()
    })
    .unwrap();
    assert!(no_media.accept(&item));
}

#[test]
fn no_positive_term_rejected() {
    let f = KeywordFilter::new(policy()).unwrap();
    let item = reddit_item(
        "AICompetitions",
        "Benchmarks of the new model",
        "",
        100,
        "https://www.reddit.com/r/AICompetitions/comments/t1",
    );
    assert_eq!(
        f.evaluate(&item),
        Verdict::Rejected(Rejection::NoPositiveTerm)
    );
}

#[test]
fn link_body_policy_controls_haystack() {
    let mut item = reddit_item(
        "AIArt",
        "Look at this",
        "part of the hackathon",
        100,
        "https://example.org/gallery",
    );
    // a link post that still carries text
    item.details = SourceDetails::Reddit {
        subreddit: "AIArt".into(),
        score: 100,
        comments: 0,
        is_self: false,
        permalink: "/r/AIArt/comments/t9".into(),
    };

    let with_body = KeywordFilter::new(policy()).unwrap();
    assert!(with_body.accept(&item));

    let title_only = KeywordFilter::new(FilterPolicy {
        include_link_body: false,
        ..policy()
    })
    .unwrap();
    assert_eq!(title_only.haystack(&item), "look at this");
    assert!(!title_only.accept(&item));
}

#[test]
fn whole_word_mode_via_policy() {
    let f = KeywordFilter::new(FilterPolicy {
        positive_terms: vec!["contest".into()],
        match_mode: MatchMode::WholeWord,
        ..policy()
    })
    .unwrap();
    let contested = reddit_item(
        "AIArt",
        "A contested ruling",
        "",
        100,
        "https://example.org/a",
    );
    assert!(!f.accept(&contested));
    let contest = reddit_item("AIArt", "Contest: week 3", "", 100, "https://example.org/b");
    assert!(f.accept(&contest));
}

#[test]
fn stateless_accept_matches_compiled_filter() {
    let item = reddit_item(
        "UnknownSub",
        "Annual AI contest",
        "",
        60,
        "https://example.org/x",
    );
    assert!(contest_alerts::filter::accept(&item, &policy()).unwrap());
}

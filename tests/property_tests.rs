/// Property-based tests using proptest
/// Tests invariants of the lead email parser that should hold for all inputs
use lead_automations::parsing::{
    budget_range, clean_text, company_from_email, name_from_email, parse_amount,
    parse_lead_email, CONSUMER_EMAIL_DOMAINS,
};
use proptest::prelude::*;

const RANGES: &[&str] = &[
    "Under $1000",
    "$1000 - $5000",
    "$5000 - $10000",
    "$10000 - $25000",
    "$25000+",
];

fn rank(label: &str) -> usize {
    RANGES.iter().position(|r| *r == label).unwrap()
}

fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// Property: Cleaning never panics and yields normalized lines
proptest! {
    #[test]
    fn clean_text_never_panics(raw in "\\PC*") {
        let _ = clean_text(&raw);
    }

    #[test]
    fn clean_text_output_is_normalized(raw in "[a-zA-Z<>/ \t\r\n:&;]{0,200}") {
        let cleaned = clean_text(&raw);
        prop_assert!(!cleaned.contains("\n\n\n"));
        prop_assert!(!cleaned.starts_with('\n'));
        prop_assert!(!cleaned.ends_with('\n'));
        for line in cleaned.lines() {
            prop_assert_eq!(line, line.trim());
        }
    }

    #[test]
    fn parse_lead_email_never_panics(from in "\\PC{0,80}", body in "\\PC{0,400}") {
        let _ = parse_lead_email(&from, "subject", &body);
    }
}

// Property: Budget amounts and ranges
proptest! {
    #[test]
    fn formatted_amounts_parse_back(n in 0u64..10_000_000u64, dollar in proptest::bool::ANY) {
        let text = format!("{}{}", if dollar { "$" } else { "" }, with_thousands(n));
        prop_assert_eq!(parse_amount(&text), Some(n as f64));
    }

    #[test]
    fn k_suffix_multiplies_by_thousand(n in 1u64..1000u64) {
        prop_assert_eq!(parse_amount(&format!("{}k", n)), Some((n * 1000) as f64));
    }

    #[test]
    fn budget_range_is_monotonic(a in 0.0f64..1_000_000.0, b in 0.0f64..1_000_000.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(rank(budget_range(lo)) <= rank(budget_range(hi)));
    }

    #[test]
    fn labelled_budget_maps_to_known_range(n in 1u64..100_000u64) {
        let parsed = parse_lead_email("a@b.io", "Inquiry", &format!("Budget: ${}", n));
        let range = parsed.budget_range.unwrap();
        prop_assert!(RANGES.contains(&range.as_str()));
    }
}

// Property: Names and companies derived from addresses
proptest! {
    #[test]
    fn name_from_email_is_never_empty(local in "[a-z][a-z0-9._\\-]{0,20}", domain in "[a-z]{2,10}\\.com") {
        let email = format!("{}@{}", local, domain);
        prop_assert!(!name_from_email(&email).is_empty());
    }

    #[test]
    fn consumer_domains_never_imply_a_company(
        local in "[a-z]{1,12}",
        idx in 0usize..CONSUMER_EMAIL_DOMAINS.len()
    ) {
        let email = format!("{}@{}", local, CONSUMER_EMAIL_DOMAINS[idx]);
        prop_assert!(company_from_email(&email).is_none());
    }

    #[test]
    fn business_domains_keep_their_domain(org in "[a-z]{3,12}", tld in "(io|com|dev|co\\.uk)") {
        let domain = format!("{}.{}", org, tld);
        prop_assume!(!CONSUMER_EMAIL_DOMAINS.contains(&domain.as_str()));
        let company = company_from_email(&format!("hello@{}", domain)).unwrap();
        prop_assert_eq!(company.domain.as_deref(), Some(domain.as_str()));
        prop_assert!(company.name.to_lowercase() == org);
    }
}

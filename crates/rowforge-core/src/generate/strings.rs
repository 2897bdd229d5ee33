//! Name-driven string generation. Column names are matched against a regex
//! catalog so that a column called `billing_email` gets an email address and
//! `country_code` gets a country, falling back to an opaque token.

use fake::faker::address::en::{CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{IPv4, SafeEmail};
use fake::faker::lorem::en::{Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use once_cell::sync::Lazy;
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;

#[derive(Debug, Clone, Copy)]
enum Kind {
    Email,
    FirstName,
    LastName,
    FullName,
    Phone,
    Ssn,
    Zip,
    Color,
    City,
    Country,
    Ip,
    Address,
    Product,
    Description,
    Feature,
    Material,
    Currency,
    Company,
    Language,
}

// order matters: `first_name` must hit the first-name entry before the
// generic `name` one
static CATALOG: Lazy<Vec<(Regex, Kind)>> = Lazy::new(|| {
    [
        ("email", Kind::Email),
        ("first.*name", Kind::FirstName),
        ("last.*name", Kind::LastName),
        ("name", Kind::FullName),
        ("phone", Kind::Phone),
        ("ssn", Kind::Ssn),
        ("zip", Kind::Zip),
        ("color", Kind::Color),
        ("city", Kind::City),
        ("country", Kind::Country),
        ("^ip", Kind::Ip),
        ("address", Kind::Address),
        ("product", Kind::Product),
        ("description", Kind::Description),
        ("feature", Kind::Feature),
        ("material", Kind::Material),
        ("currency", Kind::Currency),
        ("company", Kind::Company),
        ("language", Kind::Language),
    ]
    .into_iter()
    .map(|(pattern, kind)| (Regex::new(pattern).expect("static pattern"), kind))
    .collect()
});

const COLORS: &[&str] = &[
    "red", "blue", "green", "yellow", "purple", "orange", "black", "white", "grey", "teal",
    "maroon", "navy",
];

const MATERIALS: &[&str] = &[
    "steel", "wood", "plastic", "aluminum", "carbon", "leather", "glass", "granite", "rubber",
    "cotton",
];

const CURRENCIES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "CNY", "SEK", "NOK",
];

const LANGUAGES: &[&str] = &[
    "english", "french", "german", "spanish", "portuguese", "italian", "japanese", "mandarin",
    "arabic", "hindi", "russian",
];

/// Generate a string for a column, capped at `max_size` characters.
/// Apostrophes are stripped so the value can be inlined between single
/// quotes without further escaping.
pub fn random_string(column_name: &str, max_size: i64, rng: &mut impl Rng) -> String {
    let lowered = column_name.to_lowercase();
    let kind = CATALOG
        .iter()
        .find(|(re, _)| re.is_match(&lowered))
        .map(|(_, kind)| *kind);

    let value: String = match kind {
        Some(Kind::Email) => SafeEmail().fake_with_rng(rng),
        Some(Kind::FirstName) => FirstName().fake_with_rng(rng),
        Some(Kind::LastName) => LastName().fake_with_rng(rng),
        Some(Kind::FullName) => Name().fake_with_rng(rng),
        Some(Kind::Phone) => PhoneNumber().fake_with_rng(rng),
        Some(Kind::Ssn) => format!(
            "{:03}-{:02}-{:04}",
            rng.random_range(100..900),
            rng.random_range(10..100),
            rng.random_range(1000..10000)
        ),
        Some(Kind::Zip) => ZipCode().fake_with_rng(rng),
        Some(Kind::Color) => pick(COLORS, rng),
        Some(Kind::City) => CityName().fake_with_rng(rng),
        Some(Kind::Country) => CountryName().fake_with_rng(rng),
        Some(Kind::Ip) => IPv4().fake_with_rng(rng),
        Some(Kind::Address) => StreetName().fake_with_rng(rng),
        Some(Kind::Product) => {
            let words: Vec<String> = Words(2..4).fake_with_rng(rng);
            words.join(" ")
        }
        Some(Kind::Description) => Sentence(5..12).fake_with_rng(rng),
        Some(Kind::Feature) => Word().fake_with_rng(rng),
        Some(Kind::Material) => pick(MATERIALS, rng),
        Some(Kind::Currency) => pick(CURRENCIES, rng),
        Some(Kind::Company) => CompanyName().fake_with_rng(rng),
        Some(Kind::Language) => pick(LANGUAGES, rng),
        None => random_token(19, rng),
    };

    let truncated: String = if max_size > 0 {
        value.chars().take(max_size as usize).collect()
    } else {
        value
    };
    truncated.replace('\'', "")
}

/// Opaque lowercase alphanumeric token, the fallback for columns whose
/// names match nothing in the catalog.
pub fn random_token(len: usize, rng: &mut impl Rng) -> String {
    (0..len)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect::<String>()
        .to_lowercase()
}

fn pick(choices: &[&str], rng: &mut impl Rng) -> String {
    choices[rng.random_range(0..choices.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn email_columns_get_emails() {
        let mut rng = StdRng::seed_from_u64(1);
        let value = random_string("contact_email", 255, &mut rng);
        assert!(value.contains('@'), "expected email, got {value}");
    }

    #[test]
    fn first_name_wins_over_generic_name() {
        let mut rng = StdRng::seed_from_u64(2);
        // must not panic and must be non-empty; the dispatch itself is what
        // is under test (a full name would contain a space)
        let value = random_string("first_name", 100, &mut rng);
        assert!(!value.is_empty());
        assert!(!value.contains(' '), "expected bare first name, got {value}");
    }

    #[test]
    fn truncation_respects_max_size() {
        let mut rng = StdRng::seed_from_u64(3);
        let value = random_string("description", 5, &mut rng);
        assert!(value.chars().count() <= 5);
    }

    #[test]
    fn apostrophes_are_stripped() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let value = random_string("last_name", 255, &mut rng);
            assert!(!value.contains('\''), "apostrophe survived in {value}");
        }
    }

    #[test]
    fn unmatched_names_get_tokens() {
        let mut rng = StdRng::seed_from_u64(5);
        let value = random_string("opaque_column", 64, &mut rng);
        assert_eq!(value.len(), 19);
        assert!(value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn ip_prefix_matches_only_at_start() {
        let mut rng = StdRng::seed_from_u64(6);
        let value = random_string("ip_address", 64, &mut rng);
        assert_eq!(value.split('.').count(), 4, "expected IPv4, got {value}");
    }
}

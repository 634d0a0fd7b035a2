//! Store slugs.
//!
//! A slug is derived from the store name and disambiguated against the slugs
//! already in use by appending `-N`, where `N - 1` is the number of existing
//! slugs in the same family (`base`, `base-2`, `base-3`, ...). If that
//! suffix is still held by a store that was renamed out of the family, the
//! next free suffix is used.
//!
//! Derivation is a pure function of the name and the existing slugs, so the
//! caller decides where the existing slugs come from. The lookup and the
//! subsequent write are not atomic: two stores created concurrently with the
//! same name can end up with the same slug.

use core::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Runs of characters that cannot appear in a slug.
static NON_SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid regex"));

/// Slug used when a name contains no ASCII letters or digits.
pub const FALLBACK_SLUG: &str = "store";

/// A URL-safe store identifier: lowercase ASCII letters, digits and single
/// hyphens, never starting or ending with a hyphen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Slug` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase and hyphenate a name.
///
/// ```
/// use markets_core::slugify;
///
/// assert_eq!(slugify("Cafe Bloom").as_str(), "cafe-bloom");
/// assert_eq!(slugify("  Joe's  Pizza & Subs! ").as_str(), "joe-s-pizza-subs");
/// assert_eq!(slugify("!!!").as_str(), "store");
/// ```
#[must_use]
pub fn slugify(name: &str) -> Slug {
    let lower = name.to_lowercase();
    let hyphenated = NON_SLUG_RE.replace_all(&lower, "-");
    let trimmed = hyphenated.trim_matches('-');

    if trimmed.is_empty() {
        Slug(FALLBACK_SLUG.to_owned())
    } else {
        Slug(trimmed.to_owned())
    }
}

/// Case-insensitive `PostgreSQL` regular expression selecting every slug in
/// the family of `base` (`base` itself and `base-<digits>`).
///
/// Intended for `slug ~* $1`. Slugs never contain regex metacharacters
/// other than `-`, which is literal outside brackets.
#[must_use]
pub fn slug_family_pattern(base: &Slug) -> String {
    format!("^({})(-[0-9]*)?$", base.as_str())
}

/// Whether `candidate` belongs to the family of `base`, ignoring ASCII case.
fn in_family(base: &str, candidate: &str) -> bool {
    let Some(prefix) = candidate.get(..base.len()) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case(base) {
        return false;
    }

    let rest = candidate.get(base.len()..).unwrap_or_default();
    rest.is_empty()
        || rest
            .strip_prefix('-')
            .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Compute the slug for a store named `name`, given slugs already in use.
///
/// Slugs outside the family of the name's base slug are ignored, so callers
/// may pass a superset. The suffix is one more than the family size, moved
/// past any suffix that is still taken.
///
/// ```
/// use markets_core::compute_slug;
///
/// assert_eq!(compute_slug::<&str>("Cafe Bloom", &[]).as_str(), "cafe-bloom");
/// assert_eq!(compute_slug("Cafe Bloom", &["cafe-bloom"]).as_str(), "cafe-bloom-2");
/// assert_eq!(
///     compute_slug("Cafe Bloom", &["cafe-bloom", "cafe-bloom-2", "cafe-bloomers"]).as_str(),
///     "cafe-bloom-3"
/// );
/// ```
#[must_use]
pub fn compute_slug<S: AsRef<str>>(name: &str, existing: &[S]) -> Slug {
    let base = slugify(name);
    let family: Vec<&str> = existing
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| in_family(base.as_str(), s))
        .collect();

    if family.is_empty() {
        return base;
    }

    // Skip suffixes left in use after a store was renamed out of the family
    let mut n = family.len() + 1;
    loop {
        let candidate = format!("{}-{n}", base.0);
        if !family.iter().any(|s| s.eq_ignore_ascii_case(&candidate)) {
            return Slug(candidate);
        }
        n += 1;
    }
}

/// Compute the slug for a store being renamed to `name`.
///
/// A store whose current slug already belongs to the new name's family keeps
/// it. Otherwise the slug is computed as for a new store. `existing` may
/// include the store's own slug.
///
/// ```
/// use markets_core::{rename_slug, slugify};
///
/// let current = slugify("Cafe Bloom");
/// let existing = ["cafe-bloom", "cafe-bloom-2"];
/// assert_eq!(rename_slug("Cafe Bloom!", &current, &existing), current);
/// assert_eq!(rename_slug("Tea Room", &current, &existing).as_str(), "tea-room");
/// ```
#[must_use]
pub fn rename_slug<S: AsRef<str>>(name: &str, current: &Slug, existing: &[S]) -> Slug {
    if in_family(slugify(name).as_str(), current.as_str()) {
        current.clone()
    } else {
        compute_slug(name, existing)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Slug {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Slug {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Slug {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

//! Rule-based venue matching. Four independent rules; any true rule means
//! the candidate record refers to an existing venue. The outcome is
//! binary — the rule that fired is kept only to explain the decision in
//! logs. Multiple distinct matching venues are a data-quality finding and
//! are surfaced, never silently merged.

use uuid::Uuid;

use placematch_common::{haversine_m, CrawledRecord, MatcherConfig, Venue};

use crate::normalize::{normalize_name, normalize_phone, platform_address, string_similarity};

/// Which rule explains a match. Listed in priority order; when several
/// rules hold for one venue the highest-priority one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Same `(source_platform, platform_id)` — the update path, not a
    /// dedup heuristic.
    PlatformIdentity,
    /// Coordinates within the distance threshold and similar names.
    GeoName,
    /// Equal non-empty normalized phone numbers.
    Phone,
    /// Equal raw names and equal normalized addresses.
    NameAddress,
}

impl std::fmt::Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchRule::PlatformIdentity => "platform_identity",
            MatchRule::GeoName => "geo_name",
            MatchRule::Phone => "phone",
            MatchRule::NameAddress => "name_address",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    None,
    Matched { venue: Venue, rule: MatchRule },
    Ambiguous { venue_ids: Vec<Uuid> },
}

pub struct Matcher {
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Evaluate the record against a candidate set. Candidates may contain
    /// duplicates (they are unioned from several targeted queries); they
    /// are de-duplicated by id before the ambiguity check.
    pub fn evaluate(&self, record: &CrawledRecord, candidates: &[Venue]) -> MatchOutcome {
        let mut matched: Vec<(Venue, MatchRule)> = Vec::new();

        for candidate in candidates {
            if matched.iter().any(|(v, _)| v.id == candidate.id) {
                continue;
            }
            if let Some(rule) = self.match_rule(record, candidate) {
                matched.push((candidate.clone(), rule));
            }
        }

        match matched.len() {
            0 => MatchOutcome::None,
            1 => {
                let (venue, rule) = matched.remove(0);
                MatchOutcome::Matched { venue, rule }
            }
            _ => MatchOutcome::Ambiguous {
                venue_ids: matched.iter().map(|(v, _)| v.id).collect(),
            },
        }
    }

    /// First rule (in priority order) under which the record matches the
    /// venue, or `None`. Unknown fields fail the heuristic rules: a
    /// missing coordinate, phone, or address is never treated as equal to
    /// anything.
    pub fn match_rule(&self, record: &CrawledRecord, venue: &Venue) -> Option<MatchRule> {
        if venue.source_platform == record.platform && venue.platform_id == record.platform_id {
            return Some(MatchRule::PlatformIdentity);
        }

        if let (Some((rlat, rlng)), Some((vlat, vlng))) = (record.coords(), venue.coords()) {
            if haversine_m(rlat, rlng, vlat, vlng) <= self.config.max_distance_m {
                let similarity = string_similarity(
                    &normalize_name(&record.name),
                    &normalize_name(&venue.name),
                );
                if similarity >= self.config.min_name_similarity {
                    return Some(MatchRule::GeoName);
                }
            }
        }

        if let Some(phone) = record.phone.as_deref() {
            let record_phone = normalize_phone(phone);
            if !record_phone.is_empty() && record_phone == normalize_phone(&venue.phone) {
                return Some(MatchRule::Phone);
            }
        }

        // Addresses compare in the platform-aware normal form — the same
        // form the stored column and the candidate query use, so this
        // in-memory check agrees with what the store returns.
        if !record.name.is_empty()
            && record.name == venue.name
            && platform_address(&record.address, record.platform)
                == platform_address(&venue.address, venue.source_platform)
        {
            return Some(MatchRule::NameAddress);
        }

        None
    }
}

//! Outcome-history trust scoring.

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::relationships;
use crate::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustOutcome {
    Positive,
    Neutral,
    Negative,
}

impl TrustOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustOutcome::Positive => "POSITIVE",
            TrustOutcome::Neutral => "NEUTRAL",
            TrustOutcome::Negative => "NEGATIVE",
        }
    }
}

impl fmt::Display for TrustOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustOutcome {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(TrustOutcome::Positive),
            "NEUTRAL" => Ok(TrustOutcome::Neutral),
            "NEGATIVE" => Ok(TrustOutcome::Negative),
            other => Err(RegistryError::InvalidRequest(format!(
                "unknown trust outcome: {other}"
            ))),
        }
    }
}

pub fn record_outcome(
    conn: &Connection,
    relationship_id: &str,
    context: &str,
    outcome: TrustOutcome,
) -> Result<(), RegistryError> {
    if relationships::get_relationship(conn, relationship_id)?.is_none() {
        return Err(RegistryError::NotFound(format!("relationship {relationship_id}")));
    }
    conn.execute(
        "INSERT INTO trust_observations (relationship_id, context, outcome) VALUES (?1, ?2, ?3)",
        params![relationship_id, context, outcome.as_str()],
    )?;
    Ok(())
}

/// Score in `[0, 1]` for a relationship.
///
/// Starts at 0.5 and replays observations oldest first: a positive outcome
/// closes 10% of the distance to 1.0, a neutral one takes 5% off, a negative
/// one takes 20% off.
pub fn trust_score(conn: &Connection, relationship_id: &str) -> Result<f64, RegistryError> {
    if relationships::get_relationship(conn, relationship_id)?.is_none() {
        return Err(RegistryError::NotFound(format!("relationship {relationship_id}")));
    }

    let mut stmt = conn.prepare(
        "SELECT outcome FROM trust_observations WHERE relationship_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([relationship_id], |row| row.get::<_, String>(0))?;

    let mut score: f64 = 0.5;
    for row in rows {
        match row?.as_str() {
            "POSITIVE" => score += 0.1 * (1.0 - score),
            "NEUTRAL" => score -= 0.05 * score,
            "NEGATIVE" => score -= 0.2 * score,
            _ => {}
        }
    }

    Ok(score.clamp(0.0, 1.0))
}

pub fn label_for(score: f64) -> &'static str {
    if score >= 0.75 {
        "high"
    } else if score >= 0.5 {
        "moderate"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_relationship() -> (Connection, String) {
        let conn = Connection::open_in_memory().unwrap();
        lct_db::run_migrations(&conn).unwrap();
        let rel = relationships::create_relationship(&conn, "cell-1", "pack-1", "", None).unwrap();
        (conn, rel.relationship_id)
    }

    #[test]
    fn fresh_relationship_is_neutral() {
        let (conn, id) = db_with_relationship();
        let score = trust_score(&conn, &id).unwrap();
        assert!((score - 0.5).abs() < f64::EPSILON);
        assert_eq!(label_for(score), "moderate");
    }

    #[test]
    fn outcomes_replay_in_order() {
        let (conn, id) = db_with_relationship();
        record_outcome(&conn, &id, "transfer", TrustOutcome::Positive).unwrap();
        record_outcome(&conn, &id, "transfer", TrustOutcome::Negative).unwrap();
        // 0.5 -> 0.55 -> 0.44
        let score = trust_score(&conn, &id).unwrap();
        assert!((score - 0.44).abs() < 1e-9);
        assert_eq!(label_for(score), "low");

        for _ in 0..20 {
            record_outcome(&conn, &id, "transfer", TrustOutcome::Positive).unwrap();
        }
        let score = trust_score(&conn, &id).unwrap();
        assert!(score > 0.75 && score <= 1.0);
        assert_eq!(label_for(score), "high");
    }

    #[test]
    fn unknown_relationship_is_not_found() {
        let (conn, _) = db_with_relationship();
        assert!(matches!(
            trust_score(&conn, "lct-ghost"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            record_outcome(&conn, "lct-ghost", "", TrustOutcome::Neutral),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn outcome_parses_case_insensitively() {
        assert_eq!("positive".parse::<TrustOutcome>().unwrap(), TrustOutcome::Positive);
        assert!("great".parse::<TrustOutcome>().is_err());
    }
}

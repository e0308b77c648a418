use crate::model::{Document, MigrationError, MigrationReport, NormalizedAward};
use crate::storage::DocumentStore;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Digit run followed by x/X, anywhere in the label.
static QUANTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+)[xX]").unwrap());
/// Same token plus the whitespace after it; only this is cut from the label.
static QUANTITY_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+[xX]\s*").unwrap());

const AWARD_FIELD: &str = "award";
const QUANTITY_FIELD: &str = "quantity";

/// Splits a leading multiplier like `3x` off an award label.
///
/// When the label has no multiplier the quantity is 1 and the text is
/// returned exactly as given, without trimming.
pub fn normalize_award(award: &str) -> Result<NormalizedAward, MigrationError> {
    let Some(caps) = QUANTITY_RE.captures(award) else {
        return Ok(NormalizedAward {
            award: award.to_string(),
            quantity: 1,
        });
    };

    let digits = &caps[1];
    let quantity = digits
        .parse::<i64>()
        .map_err(|_| MigrationError::QuantityOutOfRange(digits.to_string()))?;

    let stripped = QUANTITY_TOKEN_RE.replacen(award, 1, "");
    Ok(NormalizedAward {
        award: stripped.trim().to_string(),
        quantity,
    })
}

/// A document is migrated once it carries a `quantity` key, whatever its value.
pub fn needs_migration(doc: &Document) -> bool {
    !doc.fields.contains_key(QUANTITY_FIELD)
}

/// Runs the normalization pass over every document in `collection`.
///
/// Stops at the first storage or record error; documents updated before
/// that point stay updated, and a rerun picks up where this one stopped.
pub fn normalize_collection<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
) -> Result<MigrationReport, MigrationError> {
    let started_at = Utc::now();
    info!("Normalizing awards in collection {}", collection);

    let mut scanned = 0;
    let mut skipped = 0;
    let mut updated = 0;

    for doc in store.find_all(collection)? {
        let doc = doc?;
        scanned += 1;

        if !needs_migration(&doc) {
            skipped += 1;
            continue;
        }

        let award = award_text(&doc)?;
        let normalized = normalize_award(award)?;

        let mut fields = Map::new();
        fields.insert(AWARD_FIELD.to_string(), Value::from(normalized.award.clone()));
        fields.insert(QUANTITY_FIELD.to_string(), Value::from(normalized.quantity));
        store.update_fields(collection, &doc.id, &fields)?;

        debug!(
            "Updated {}: {:?} -> {:?} x{}",
            doc.id, award, normalized.award, normalized.quantity
        );
        updated += 1;
    }

    let report = MigrationReport {
        scanned,
        skipped,
        updated,
        started_at,
        finished_at: Utc::now(),
    };
    info!(
        "Finished {}: scanned = {}, skipped = {}, updated = {}",
        collection, report.scanned, report.skipped, report.updated
    );
    Ok(report)
}

fn award_text(doc: &Document) -> Result<&str, MigrationError> {
    match doc.get(AWARD_FIELD) {
        Some(Value::String(award)) => Ok(award),
        Some(other) => Err(MigrationError::MalformedRecord {
            id: doc.id.clone(),
            reason: format!("award is not a string: {}", other),
        }),
        None => Err(MigrationError::MalformedRecord {
            id: doc.id.clone(),
            reason: "award field is missing".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StorageError;
    use crate::storage::{DocumentCursor, SqliteStorage};
    use serde_json::json;
    use std::cell::Cell;

    const COLLECTION: &str = "seasonawards";

    fn norm(award: &str) -> (String, i64) {
        let n = normalize_award(award).unwrap();
        (n.award, n.quantity)
    }

    fn seed(store: &SqliteStorage, docs: &[(&str, Value)]) {
        for (id, body) in docs {
            let fields = body.as_object().cloned().unwrap();
            store.insert(COLLECTION, &Document::new(*id, fields)).unwrap();
        }
    }

    fn fetch(store: &SqliteStorage, id: &str) -> Document {
        store.get(COLLECTION, id).unwrap().unwrap()
    }

    #[test]
    fn leading_multiplier_is_extracted() {
        assert_eq!(norm("10x Community Shield"), ("Community Shield".to_string(), 10));
        assert_eq!(norm("5X Trophy"), ("Trophy".to_string(), 5));
        assert_eq!(norm("3x   Golden Boot  "), ("Golden Boot".to_string(), 3));
    }

    #[test]
    fn no_multiplier_defaults_to_one_and_keeps_text() {
        assert_eq!(norm("Player of the Match"), ("Player of the Match".to_string(), 1));
        assert_eq!(norm("  Player of the Match "), ("  Player of the Match ".to_string(), 1));
        assert_eq!(norm("x5 Boots"), ("x5 Boots".to_string(), 1));
    }

    #[test]
    fn only_first_multiplier_is_stripped() {
        assert_eq!(norm("2x Gold 3x Bonus"), ("Gold 3x Bonus".to_string(), 2));
    }

    #[test]
    fn mid_string_match_keeps_preceding_whitespace() {
        assert_eq!(norm("Gold 2x Boot"), ("Gold Boot".to_string(), 2));
        assert_eq!(norm("Gold  2x Boot"), ("Gold  Boot".to_string(), 2));
        assert_eq!(norm("TOTS 4x"), ("TOTS".to_string(), 4));
    }

    #[test]
    fn zero_and_bare_multipliers_follow_the_rule() {
        assert_eq!(norm("0x Award"), ("Award".to_string(), 0));
        assert_eq!(norm("3x"), ("".to_string(), 3));
        assert_eq!(norm("  3X  "), ("".to_string(), 3));
    }

    #[test]
    fn only_ascii_digits_form_a_multiplier() {
        assert_eq!(norm("\u{663}x Trophy"), ("\u{663}x Trophy".to_string(), 1));
        assert_eq!(norm("\u{663}x 2x Trophy"), ("\u{663}x Trophy".to_string(), 2));
    }

    #[test]
    fn huge_digit_run_is_rejected() {
        let err = normalize_award("99999999999999999999x Trophy").unwrap_err();
        assert!(matches!(err, MigrationError::QuantityOutOfRange(_)));
    }

    #[test]
    fn pass_migrates_and_keeps_other_fields() {
        let store = SqliteStorage::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("1", json!({"season": "22/23", "award": "10x Community Shield"})),
                ("2", json!({"season": "23/24", "award": "Player of the Match"})),
            ],
        );

        let report = normalize_collection(&store, COLLECTION).unwrap();
        assert_eq!((report.scanned, report.skipped, report.updated), (2, 0, 2));
        assert!(report.finished_at >= report.started_at);

        let first = fetch(&store, "1");
        assert_eq!(first.get("award"), Some(&json!("Community Shield")));
        assert_eq!(first.get("quantity"), Some(&json!(10)));
        assert_eq!(first.get("season"), Some(&json!("22/23")));

        let second = fetch(&store, "2");
        assert_eq!(second.get("award"), Some(&json!("Player of the Match")));
        assert_eq!(second.get("quantity"), Some(&json!(1)));
    }

    #[test]
    fn second_run_writes_nothing() {
        let store = SqliteStorage::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("1", json!({"award": "2x Gold 3x Bonus"})),
                ("2", json!({"award": "5X Trophy"})),
            ],
        );

        normalize_collection(&store, COLLECTION).unwrap();
        let after_first: Vec<Document> = vec![fetch(&store, "1"), fetch(&store, "2")];

        let report = normalize_collection(&store, COLLECTION).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 2);
        assert_eq!(vec![fetch(&store, "1"), fetch(&store, "2")], after_first);
        assert_eq!(after_first[0].get("award"), Some(&json!("Gold 3x Bonus")));
    }

    #[test]
    fn existing_quantity_is_never_rewritten() {
        let store = SqliteStorage::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("zero", json!({"award": "4x Cup", "quantity": 0})),
                ("null", json!({"award": "4x Cup", "quantity": null})),
            ],
        );

        let report = normalize_collection(&store, COLLECTION).unwrap();
        assert_eq!(report.updated, 0);
        assert_eq!(fetch(&store, "zero").get("award"), Some(&json!("4x Cup")));
        assert_eq!(fetch(&store, "null").get("quantity"), Some(&Value::Null));
    }

    #[test]
    fn missing_award_halts_but_keeps_earlier_updates() {
        let store = SqliteStorage::open_in_memory().unwrap();
        seed(
            &store,
            &[
                ("1", json!({"award": "2x League"})),
                ("2", json!({"season": "21/22"})),
                ("3", json!({"award": "3x Cup"})),
            ],
        );

        let err = normalize_collection(&store, COLLECTION).unwrap_err();
        assert!(matches!(err, MigrationError::MalformedRecord { ref id, .. } if id == "2"));
        assert_eq!(fetch(&store, "1").get("quantity"), Some(&json!(2)));
        assert_eq!(fetch(&store, "3").get("quantity"), None);
    }

    #[test]
    fn non_string_award_is_malformed() {
        let store = SqliteStorage::open_in_memory().unwrap();
        seed(&store, &[("1", json!({"award": 7}))]);

        let err = normalize_collection(&store, COLLECTION).unwrap_err();
        assert!(matches!(err, MigrationError::MalformedRecord { .. }));
    }

    /// Wraps a store and fails the n-th update.
    struct FlakyStore {
        inner: SqliteStorage,
        fail_on: usize,
        calls: Cell<usize>,
    }

    impl DocumentStore for FlakyStore {
        fn find_all<'a>(&'a self, collection: &str) -> Result<DocumentCursor<'a>, StorageError> {
            self.inner.find_all(collection)
        }

        fn update_fields(
            &self,
            collection: &str,
            id: &str,
            fields: &Map<String, Value>,
        ) -> Result<(), StorageError> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() == self.fail_on {
                return Err(StorageError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            self.inner.update_fields(collection, id, fields)
        }
    }

    #[test]
    fn storage_failure_propagates_and_rerun_resumes() {
        let inner = SqliteStorage::open_in_memory().unwrap();
        seed(
            &inner,
            &[
                ("1", json!({"award": "2x League"})),
                ("2", json!({"award": "3x Cup"})),
                ("3", json!({"award": "Golden Glove"})),
            ],
        );
        let flaky = FlakyStore {
            inner,
            fail_on: 2,
            calls: Cell::new(0),
        };

        let err = normalize_collection(&flaky, COLLECTION).unwrap_err();
        assert!(matches!(err, MigrationError::Storage(StorageError::NotFound { .. })));
        assert_eq!(fetch(&flaky.inner, "1").get("quantity"), Some(&json!(2)));
        assert_eq!(fetch(&flaky.inner, "2").get("quantity"), None);

        let report = normalize_collection(&flaky.inner, COLLECTION).unwrap();
        assert_eq!((report.skipped, report.updated), (1, 2));
        assert_eq!(fetch(&flaky.inner, "2").get("award"), Some(&json!("Cup")));
    }
}

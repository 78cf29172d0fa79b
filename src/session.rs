//! Reduction of a history dump to one record per type.
//!
//! The scale replays up to 30 weighings on every connection, newest or oldest
//! first depending on firmware, and never says when it is done. A session
//! therefore keeps the latest plausible weight and body record it has seen
//! and lets the disconnect decide when the result is final.

use log::debug;

use crate::codec::{BodyRecord, PersonRecord, Record, WeightRecord};

/// Records accumulated during one connection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Session {
    pub person: PersonRecord,
    pub weight: WeightRecord,
    pub body: BodyRecord,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded record into the session.
    ///
    /// `now` is the host's idea of the current time; weighings claiming to
    /// be from the future are discarded.
    pub fn ingest(&mut self, record: Record, now: i64) {
        match record {
            Record::Person(person) => self.ingest_person(person),
            Record::Weight(weight) => {
                if weight.timestamp > now {
                    debug!("dropping future weight record {weight}");
                } else if !self.same_slot(weight.slot) {
                    debug!("dropping weight record of another person {weight}");
                } else if weight.rank() > self.weight.rank() {
                    debug!("weight {weight}");
                    self.weight = weight;
                }
            }
            Record::Body(body) => {
                if body.timestamp > now {
                    debug!("dropping future body record {body}");
                } else if !self.same_slot(body.slot) {
                    debug!("dropping body record of another person {body}");
                } else if body.rank() > self.body.rank() {
                    debug!("body {body}");
                    self.body = body;
                }
            }
        }
    }

    /// Once the person is known, only their own measurements are kept.
    fn same_slot(&self, slot: u8) -> bool {
        !self.person.valid || self.person.slot == slot
    }

    fn ingest_person(&mut self, person: PersonRecord) {
        if self.person.valid {
            debug!("ignoring additional person record {person}");
        } else if person.valid {
            debug!("person {person}");
            self.person = person;
        }
    }

    /// The records to publish.
    pub fn finalize(&self) -> Session {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn weight(timestamp: i64, slot: u8, weight_kg: f64) -> Record {
        Record::Weight(WeightRecord {
            valid: true,
            timestamp,
            slot,
            weight_kg,
        })
    }

    fn person(slot: u8) -> PersonRecord {
        PersonRecord {
            valid: true,
            slot,
            is_male: true,
            age_years: 40,
            height_m: 1.8,
            high_activity: false,
        }
    }

    #[test]
    fn test_latest_weight_wins_regardless_of_order() {
        let mut session = Session::new();
        session.ingest(weight(100, 1, 80.0), NOW);
        session.ingest(weight(50, 2, 70.0), NOW);
        session.ingest(weight(200, 3, 60.0), NOW);

        let result = session.finalize();
        assert_eq!(result.weight.timestamp, 200);
        assert_eq!(result.weight.slot, 3);
        assert_eq!(result.weight.weight_kg, 60.0);
    }

    #[test]
    fn test_equal_timestamp_keeps_first() {
        let mut session = Session::new();
        session.ingest(weight(100, 1, 80.0), NOW);
        session.ingest(weight(100, 1, 81.0), NOW);
        assert_eq!(session.weight.weight_kg, 80.0);
    }

    #[test]
    fn test_future_records_are_dropped() {
        let mut session = Session::new();
        session.ingest(weight(NOW + 1, 1, 80.0), NOW);
        assert!(!session.weight.valid);

        session.ingest(weight(NOW, 1, 79.0), NOW);
        assert!(session.weight.valid);
        assert_eq!(session.weight.weight_kg, 79.0);

        session.ingest(
            Record::Body(BodyRecord {
                valid: true,
                timestamp: NOW + 3600,
                slot: 1,
                ..BodyRecord::default()
            }),
            NOW,
        );
        assert!(!session.body.valid);
    }

    #[test]
    fn test_invalid_records_never_replace() {
        let mut session = Session::new();
        session.ingest(Record::Weight(WeightRecord::default()), NOW);
        assert_eq!(session.weight, WeightRecord::default());

        session.ingest(weight(10, 1, 80.0), NOW);
        session.ingest(Record::Weight(WeightRecord::default()), NOW);
        assert!(session.weight.valid);
        assert_eq!(session.weight.timestamp, 10);
    }

    #[test]
    fn test_first_valid_person_wins() {
        let mut session = Session::new();
        session.ingest(Record::Person(PersonRecord::default()), NOW);
        assert!(!session.person.valid);

        session.ingest(Record::Person(person(2)), NOW);
        session.ingest(Record::Person(person(5)), NOW);
        assert_eq!(session.person.slot, 2);
    }

    #[test]
    fn test_records_of_other_slots_are_dropped_once_person_known() {
        let mut session = Session::new();
        session.ingest(Record::Person(person(2)), NOW);
        session.ingest(weight(100, 2, 80.0), NOW);
        session.ingest(weight(200, 3, 60.0), NOW);
        assert_eq!(session.weight.slot, 2);
        assert_eq!(session.weight.timestamp, 100);
    }

    #[test]
    fn test_body_reduced_independently() {
        let mut session = Session::new();
        session.ingest(weight(300, 1, 80.0), NOW);
        for timestamp in [20, 40, 30] {
            session.ingest(
                Record::Body(BodyRecord {
                    valid: true,
                    timestamp,
                    slot: 1,
                    kcal: timestamp as u16,
                    ..BodyRecord::default()
                }),
                NOW,
            );
        }
        assert_eq!(session.weight.timestamp, 300);
        assert_eq!(session.body.timestamp, 40);
        assert_eq!(session.body.kcal, 40);
    }
}

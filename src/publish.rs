//! Hand-off of a finished session to whatever consumes the readings.
//!
//! Readings are keyed by the scale's user slot. Which consumer receives which
//! slot is decided by a [`SlotRouter`] built from configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, error, info};
use serde::Deserialize;

use crate::session::Session;

/// Number of user slots on the scale.
pub const MAX_SLOTS: u8 = 8;

/// A user slot, 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u8);

impl Slot {
    pub fn new(slot: u8) -> Option<Self> {
        (1..=MAX_SLOTS).contains(&slot).then_some(Slot(slot))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = Slot> {
        (1..=MAX_SLOTS).map(Slot)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Weight,
    Bmi,
    Kcal,
    Fat,
    Water,
    Muscle,
    Bone,
    Age,
    Height,
    Male,
    Female,
    HighActivity,
}

impl Metric {
    pub const ALL: [Metric; 12] = [
        Metric::Weight,
        Metric::Bmi,
        Metric::Kcal,
        Metric::Fat,
        Metric::Water,
        Metric::Muscle,
        Metric::Bone,
        Metric::Age,
        Metric::Height,
        Metric::Male,
        Metric::Female,
        Metric::HighActivity,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Weight => "weight",
            Metric::Bmi => "bmi",
            Metric::Kcal => "kcal",
            Metric::Fat => "fat",
            Metric::Water => "tbw",
            Metric::Muscle => "muscle",
            Metric::Bone => "bone",
            Metric::Age => "age",
            Metric::Height => "size",
            Metric::Male => "male",
            Metric::Female => "female",
            Metric::HighActivity => "highactivity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Flag(bool),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(value) => write!(f, "{value:.2}"),
            MetricValue::Flag(value) => write!(f, "{value}"),
        }
    }
}

/// Receiver of final readings.
pub trait Publish {
    fn publish(&mut self, slot: Slot, metric: Metric, value: MetricValue);
}

/// Publish every metric a finished session yields.
///
/// Nothing is published unless the person record is valid and names a slot
/// in range; weight and body values are only published when they belong to
/// that same slot. Returns the slot that was published, if any.
pub fn publish_session<P: Publish + ?Sized>(session: &Session, sink: &mut P) -> Option<Slot> {
    let person = &session.person;
    if !person.valid {
        debug!("no person record received, nothing to publish");
        return None;
    }
    info!("person {person}");

    let Some(slot) = Slot::new(person.slot) else {
        error!("user not defined {}", person.slot);
        return None;
    };

    sink.publish(slot, Metric::Age, MetricValue::Number(f64::from(person.age_years)));
    sink.publish(slot, Metric::Height, MetricValue::Number(person.height_m));
    sink.publish(slot, Metric::Male, MetricValue::Flag(person.is_male));
    sink.publish(slot, Metric::Female, MetricValue::Flag(!person.is_male));
    sink.publish(slot, Metric::HighActivity, MetricValue::Flag(person.high_activity));

    let weight = &session.weight;
    if weight.valid && weight.slot == person.slot {
        info!("weight {weight}");
        sink.publish(slot, Metric::Weight, MetricValue::Number(weight.weight_kg));
        if person.height_m > 0.0 {
            let bmi = weight.weight_kg / (person.height_m * person.height_m);
            sink.publish(slot, Metric::Bmi, MetricValue::Number(bmi));
        }
    }

    let body = &session.body;
    if body.valid && body.slot == person.slot {
        info!("body {body}");
        sink.publish(slot, Metric::Kcal, MetricValue::Number(f64::from(body.kcal)));
        sink.publish(slot, Metric::Fat, MetricValue::Number(body.fat_pct));
        sink.publish(slot, Metric::Water, MetricValue::Number(body.water_pct));
        sink.publish(slot, Metric::Muscle, MetricValue::Number(body.muscle_pct));
        sink.publish(slot, Metric::Bone, MetricValue::Number(body.bone_pct));
    }

    Some(slot)
}

struct Route {
    sink: Box<dyn Publish>,
    metrics: Option<BTreeSet<Metric>>,
}

/// Dispatches readings to the sink wired for their slot.
#[derive(Default)]
pub struct SlotRouter {
    routes: BTreeMap<Slot, Route>,
}

impl SlotRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire `sink` to `slot`. `metrics` restricts which readings it gets;
    /// `None` forwards all of them.
    pub fn route(
        &mut self,
        slot: Slot,
        sink: Box<dyn Publish>,
        metrics: Option<impl IntoIterator<Item = Metric>>,
    ) -> &mut Self {
        let metrics = metrics.map(|metrics| metrics.into_iter().collect());
        self.routes.insert(slot, Route { sink, metrics });
        self
    }

    pub fn is_routed(&self, slot: Slot) -> bool {
        self.routes.contains_key(&slot)
    }
}

impl Publish for SlotRouter {
    fn publish(&mut self, slot: Slot, metric: Metric, value: MetricValue) {
        let Some(route) = self.routes.get_mut(&slot) else {
            debug!("no sink for slot {slot}, dropping {metric}");
            return;
        };
        if route.metrics.as_ref().is_some_and(|wanted| !wanted.contains(&metric)) {
            return;
        }
        route.sink.publish(slot, metric, value);
    }
}

/// Writes each reading as a `metric,slot,value` log line.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    label: Option<String>,
}

impl LogSink {
    pub fn new(label: Option<String>) -> Self {
        Self { label }
    }
}

impl Publish for LogSink {
    fn publish(&mut self, slot: Slot, metric: Metric, value: MetricValue) {
        match &self.label {
            Some(label) => info!("{metric},{slot},{value},{label}"),
            None => info!("{metric},{slot},{value}"),
        }
    }
}

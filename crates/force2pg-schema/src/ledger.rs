//! Enumerated-value ledgers.
//!
//! Lookup table rows are referenced by integer id from the main table (and
//! from junction tables), so an id must never change once it has been handed
//! out, and must never be handed out twice. Ids are assigned by declaration
//! position the first time a lookup table is derived; every later run goes
//! through [`ValueLedger::reconcile`], which keeps the ids recorded in the
//! previous artifact and appends new values after the high-water mark.

use indexmap::IndexMap;

/// Largest id a lookup row can carry: the range of a Postgres SERIAL.
pub const MAX_VALUE_ID: u32 = i32::MAX as u32;

/// The values of one lookup table, each with its stable id.
///
/// Besides the live values, the ledger remembers the largest id it has ever
/// handed out, so the id of a deleted value is not given to a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueLedger {
    entries: IndexMap<String, u32>,
    high_water: u32,
}

impl ValueLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number values 1, 2, 3, ... in declaration order.
    ///
    /// Repeated values keep their first id.
    pub fn from_positional<S: AsRef<str>>(values: impl IntoIterator<Item = S>) -> Self {
        let mut ledger = Self::new();
        for value in values {
            ledger.push(value.as_ref());
        }
        ledger
    }

    /// Record `value` under `id`, as read back from a previous artifact.
    ///
    /// A value already present keeps its id. An id that is already taken, is
    /// zero or is out of the SERIAL range is replaced by the next free one.
    /// Returns the id the value ends up with.
    pub fn insert(&mut self, value: impl Into<String>, id: u32) -> u32 {
        let value = value.into();
        if let Some(existing) = self.entries.get(&value) {
            return *existing;
        }
        let id = if id == 0 || id > MAX_VALUE_ID || self.entries.values().any(|taken| *taken == id)
        {
            self.next_id()
        } else {
            id
        };
        self.record(value, id);
        id
    }

    /// Append `value` with the next free id, or return its existing id.
    pub fn push(&mut self, value: impl Into<String>) -> u32 {
        let value = value.into();
        if let Some(existing) = self.entries.get(&value) {
            return *existing;
        }
        let id = self.next_id();
        self.record(value, id);
        id
    }

    fn record(&mut self, value: String, id: u32) {
        self.high_water = self.high_water.max(id);
        self.entries.insert(value, id);
    }

    /// Remember that ids up to `id` have been handed out, even if no live
    /// value carries them anymore. Ids beyond the SERIAL range are clamped.
    pub fn raise_high_water(&mut self, id: u32) {
        self.high_water = self.high_water.max(id.min(MAX_VALUE_ID));
    }

    /// The largest id ever handed out by this ledger or its baselines.
    pub fn high_water(&self) -> u32 {
        self.high_water
    }

    /// The id of `value`, if recorded.
    pub fn id_of(&self, value: &str) -> Option<u32> {
        self.entries.get(value).copied()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.entries.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the high-water mark (1 for a fresh ledger).
    ///
    /// Saturates at [`MAX_VALUE_ID`]; a table that has used up the SERIAL
    /// range can't take new rows anyway.
    pub fn next_id(&self) -> u32 {
        self.high_water.saturating_add(1).min(MAX_VALUE_ID)
    }

    /// Iterate `(id, value)` pairs in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(value, id)| (*id, value.as_str()))
    }

    /// Iterate the values in ledger order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Carry ids over from `baseline` into this (freshly derived) ledger.
    ///
    /// Values present in both keep the baseline id. Values only in `self` are
    /// appended, in `self` order, after the baseline's high-water mark. Values
    /// only in the baseline are dropped, but their ids stay used. Without a
    /// baseline, `self` is returned unchanged.
    pub fn reconcile(&self, baseline: Option<&ValueLedger>) -> ValueLedger {
        let Some(baseline) = baseline else {
            return self.clone();
        };

        let mut out = ValueLedger::new();
        out.high_water = baseline.high_water;
        for (id, value) in baseline.iter() {
            if self.contains(value) {
                out.record(value.to_string(), id);
            }
        }

        for value in self.values() {
            if !out.contains(value) {
                let id = out.next_id();
                out.record(value.to_string(), id);
            }
        }

        out
    }
}

/// Ledgers for every lookup table, indexed by lookup table name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumeratedValueSet {
    ledgers: IndexMap<String, ValueLedger>,
}

impl EnumeratedValueSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ledger for `table`, replacing any previous one.
    pub fn insert(&mut self, table: impl Into<String>, ledger: ValueLedger) {
        self.ledgers.insert(table.into(), ledger);
    }

    /// Get the ledger for `table`.
    pub fn get(&self, table: &str) -> Option<&ValueLedger> {
        self.ledgers.get(table)
    }

    /// Get (or create) the ledger for `table`.
    pub fn entry(&mut self, table: impl Into<String>) -> &mut ValueLedger {
        self.ledgers.entry(table.into()).or_default()
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Iterate `(table, ledger)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueLedger)> {
        self.ledgers.iter().map(|(table, ledger)| (table.as_str(), ledger))
    }

    /// Reconcile every ledger in `self` against the matching baseline ledger.
    ///
    /// Tables that only exist in the baseline are not carried over.
    pub fn reconcile(&self, baseline: &EnumeratedValueSet) -> EnumeratedValueSet {
        let ledgers = self
            .ledgers
            .iter()
            .map(|(table, ledger)| (table.clone(), ledger.reconcile(baseline.get(table))))
            .collect();
        EnumeratedValueSet { ledgers }
    }
}

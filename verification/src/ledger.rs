//! Attestation code ledger — record of codes received and per-slot input
//! status.
//!
//! The ledger is the single owner of attestation codes and slot statuses.
//! It enforces the two hard invariants of code collection:
//! - no two codes on record normalize to the same canonical value;
//! - a slot may only become `Accepted` out of `Processing`, and `Accepted`
//!   is terminal.
//!
//! A code whose completion proof failed for a reason that does not
//! invalidate the code itself can be evicted from the record, freeing its
//! value for resubmission.

use attesta_types::AccountAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intake::normalize_code;

/// How a code entered the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeInputType {
    /// Retrieved by the OS SMS listener.
    Automatic,
    /// Typed or pasted by the user.
    Manual,
}

/// Per-slot input status. Exactly one slot transitions at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeInputStatus {
    /// Slot not yet open for input.
    Disabled,
    /// Slot open, awaiting a code.
    Inputting,
    /// A code has been recorded for this slot.
    Received,
    /// The code's completion proof is being submitted.
    Processing,
    /// Proof accepted on chain. Terminal.
    Accepted,
    /// The code was rejected; the slot can be retried.
    Error,
}

/// One attestation code, identified for dedupe by its case-folded payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationCode {
    /// The message as received (SMS body or pasted text).
    pub raw_message: String,
    /// The 8-digit security code, when the short-code format was used.
    pub short_code: Option<String>,
    /// Issuer embedded in the full message format, if any.
    pub issuer: Option<AccountAddress>,
    /// Extracted payload exactly as received; submitted on chain verbatim.
    /// Dedupe compares its case-folded form, never this value.
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("attestation code was already entered")]
    DuplicateCode,

    #[error("slot {0} out of range")]
    SlotOutOfRange(usize),

    #[error("slot {slot}: invalid transition {from:?} -> {to:?}")]
    InvalidSlotTransition {
        slot: usize,
        from: CodeInputStatus,
        to: CodeInputStatus,
    },

    #[error("no open slot available for an incoming code")]
    NoOpenSlot,
}

/// In-memory record of received attestation codes and slot statuses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttestationLedger {
    codes: Vec<AttestationCode>,
    slots: Vec<CodeInputStatus>,
    /// Which code (index into `codes`) occupies each slot.
    slot_codes: Vec<Option<usize>>,
}

impl AttestationLedger {
    /// A ledger with `total` slots, all initially disabled.
    pub fn new(total: u32) -> Self {
        Self {
            codes: Vec::new(),
            slots: vec![CodeInputStatus::Disabled; total as usize],
            slot_codes: vec![None; total as usize],
        }
    }

    /// Open all non-terminal slots for input (entering code collection).
    pub fn open_slots(&mut self) {
        for status in &mut self.slots {
            if *status == CodeInputStatus::Disabled {
                *status = CodeInputStatus::Inputting;
            }
        }
    }

    /// Record a received code.
    ///
    /// Dedupes against every code still on record by case-folded payload; a
    /// duplicate is an error the caller must surface, never a silent drop.
    /// Manual input carries its slot; automatic input takes the first open
    /// slot. Returns the slot the code was assigned to.
    pub fn receive(
        &mut self,
        code: AttestationCode,
        input_type: CodeInputType,
        slot: Option<usize>,
    ) -> Result<usize, LedgerError> {
        let key = normalize_code(&code.payload);
        if self
            .codes
            .iter()
            .any(|c| normalize_code(&c.payload) == key)
        {
            return Err(LedgerError::DuplicateCode);
        }

        let slot = match (input_type, slot) {
            (CodeInputType::Manual, Some(i)) => {
                if i >= self.slots.len() {
                    return Err(LedgerError::SlotOutOfRange(i));
                }
                i
            }
            _ => self
                .slots
                .iter()
                .position(|s| matches!(s, CodeInputStatus::Inputting | CodeInputStatus::Error))
                .ok_or(LedgerError::NoOpenSlot)?,
        };

        if self.slots[slot] == CodeInputStatus::Accepted {
            return Err(LedgerError::InvalidSlotTransition {
                slot,
                from: CodeInputStatus::Accepted,
                to: CodeInputStatus::Received,
            });
        }

        self.codes.push(code);
        self.slot_codes[slot] = Some(self.codes.len() - 1);
        self.slots[slot] = CodeInputStatus::Received;
        Ok(slot)
    }

    /// Transition a single slot.
    ///
    /// `Accepted` requires the slot to currently be `Processing` — accepting
    /// unprocessed input is a programming error, not a no-op. Any transition
    /// out of `Accepted` is rejected.
    pub fn set_slot_status(
        &mut self,
        slot: usize,
        status: CodeInputStatus,
    ) -> Result<(), LedgerError> {
        let current = *self
            .slots
            .get(slot)
            .ok_or(LedgerError::SlotOutOfRange(slot))?;

        let invalid = (status == CodeInputStatus::Accepted
            && current != CodeInputStatus::Processing)
            || (current == CodeInputStatus::Accepted && status != CodeInputStatus::Accepted);
        if invalid {
            return Err(LedgerError::InvalidSlotTransition {
                slot,
                from: current,
                to: status,
            });
        }

        self.slots[slot] = status;
        Ok(())
    }

    /// Drop the code record occupying a slot, freeing its value for
    /// resubmission. The slot keeps its current status.
    pub fn evict_code(&mut self, slot: usize) {
        let Some(entry) = self.slot_codes.get_mut(slot) else {
            return;
        };
        let Some(idx) = entry.take() else {
            return;
        };
        self.codes.remove(idx);
        for occupant in self.slot_codes.iter_mut().flatten() {
            if *occupant > idx {
                *occupant -= 1;
            }
        }
    }

    pub fn slot_status(&self, slot: usize) -> Option<CodeInputStatus> {
        self.slots.get(slot).copied()
    }

    pub fn slot_statuses(&self) -> &[CodeInputStatus] {
        &self.slots
    }

    /// The code currently assigned to a slot.
    pub fn code_in_slot(&self, slot: usize) -> Option<&AttestationCode> {
        self.slot_codes
            .get(slot)
            .copied()
            .flatten()
            .map(|i| &self.codes[i])
    }

    /// All recorded codes, in arrival order.
    pub fn codes(&self) -> &[AttestationCode] {
        &self.codes
    }

    /// Number of slots whose proof has been accepted on chain.
    pub fn count_accepted(&self) -> u32 {
        self.slots
            .iter()
            .filter(|s| **s == CodeInputStatus::Accepted)
            .count() as u32
    }

    pub fn total(&self) -> u32 {
        self.slots.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn code(payload: &str) -> AttestationCode {
        AttestationCode {
            raw_message: format!("msg {payload}"),
            short_code: None,
            issuer: None,
            payload: payload.to_string(),
        }
    }

    fn open_ledger() -> AttestationLedger {
        let mut ledger = AttestationLedger::new(3);
        ledger.open_slots();
        ledger
    }

    // ── Dedupe ──────────────────────────────────────────────────────────

    #[test]
    fn duplicate_code_rejected() {
        let mut ledger = open_ledger();
        ledger
            .receive(code("abc123"), CodeInputType::Automatic, None)
            .unwrap();
        let err = ledger
            .receive(code("abc123"), CodeInputType::Automatic, None)
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateCode);
    }

    #[test]
    fn dedupe_is_case_and_whitespace_insensitive() {
        let mut ledger = open_ledger();
        ledger
            .receive(code("AbC123"), CodeInputType::Manual, Some(0))
            .unwrap();
        let err = ledger
            .receive(code("  abc123 "), CodeInputType::Manual, Some(1))
            .unwrap_err();
        assert_eq!(err, LedgerError::DuplicateCode);
    }

    #[test]
    fn evicted_code_can_be_resubmitted() {
        let mut ledger = open_ledger();
        let slot = ledger
            .receive(code("abc123"), CodeInputType::Automatic, None)
            .unwrap();
        ledger
            .set_slot_status(slot, CodeInputStatus::Processing)
            .unwrap();
        ledger.set_slot_status(slot, CodeInputStatus::Error).unwrap();
        ledger.evict_code(slot);

        // the identical value is no longer a duplicate and reclaims the slot
        assert_eq!(
            ledger
                .receive(code("abc123"), CodeInputType::Automatic, None)
                .unwrap(),
            slot
        );
    }

    #[test]
    fn eviction_keeps_other_slots_mapped() {
        let mut ledger = open_ledger();
        ledger
            .receive(code("first"), CodeInputType::Automatic, None)
            .unwrap();
        ledger
            .receive(code("second"), CodeInputType::Automatic, None)
            .unwrap();

        ledger.set_slot_status(0, CodeInputStatus::Error).unwrap();
        ledger.evict_code(0);

        assert!(ledger.code_in_slot(0).is_none());
        assert_eq!(ledger.code_in_slot(1).unwrap().payload, "second");
    }

    proptest! {
        /// For any sequence of receives, no two recorded codes share a
        /// normalized value and accepted never exceeds total.
        #[test]
        fn no_two_recorded_codes_collide(payloads in proptest::collection::vec("[a-zA-Z0-9]{4,10}", 1..12)) {
            let mut ledger = open_ledger();
            for p in &payloads {
                let _ = ledger.receive(code(p), CodeInputType::Automatic, None);
            }
            let mut normalized: Vec<String> =
                ledger.codes().iter().map(|c| normalize_code(&c.payload)).collect();
            let before = normalized.len();
            normalized.sort();
            normalized.dedup();
            prop_assert_eq!(before, normalized.len());
            prop_assert!(ledger.count_accepted() <= ledger.total());
        }
    }

    // ── Slot transitions ────────────────────────────────────────────────

    #[test]
    fn accepted_requires_processing() {
        let mut ledger = open_ledger();
        let slot = ledger
            .receive(code("abc"), CodeInputType::Automatic, None)
            .unwrap();
        let err = ledger
            .set_slot_status(slot, CodeInputStatus::Accepted)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSlotTransition { .. }));

        ledger
            .set_slot_status(slot, CodeInputStatus::Processing)
            .unwrap();
        ledger
            .set_slot_status(slot, CodeInputStatus::Accepted)
            .unwrap();
        assert_eq!(ledger.count_accepted(), 1);
    }

    #[test]
    fn accepted_is_terminal() {
        let mut ledger = open_ledger();
        let slot = ledger
            .receive(code("abc"), CodeInputType::Automatic, None)
            .unwrap();
        ledger
            .set_slot_status(slot, CodeInputStatus::Processing)
            .unwrap();
        ledger
            .set_slot_status(slot, CodeInputStatus::Accepted)
            .unwrap();

        let err = ledger
            .set_slot_status(slot, CodeInputStatus::Inputting)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSlotTransition { .. }));
    }

    #[test]
    fn automatic_codes_fill_slots_in_order() {
        let mut ledger = open_ledger();
        assert_eq!(
            ledger
                .receive(code("a1"), CodeInputType::Automatic, None)
                .unwrap(),
            0
        );
        assert_eq!(
            ledger
                .receive(code("b2"), CodeInputType::Automatic, None)
                .unwrap(),
            1
        );
        assert_eq!(
            ledger
                .receive(code("c3"), CodeInputType::Automatic, None)
                .unwrap(),
            2
        );
        assert_eq!(
            ledger
                .receive(code("d4"), CodeInputType::Automatic, None)
                .unwrap_err(),
            LedgerError::NoOpenSlot
        );
    }

    #[test]
    fn count_accepted_never_exceeds_total() {
        let mut ledger = open_ledger();
        for (i, p) in ["x1", "x2", "x3"].iter().enumerate() {
            let slot = ledger.receive(code(p), CodeInputType::Automatic, None).unwrap();
            assert_eq!(slot, i);
            ledger
                .set_slot_status(slot, CodeInputStatus::Processing)
                .unwrap();
            ledger
                .set_slot_status(slot, CodeInputStatus::Accepted)
                .unwrap();
        }
        assert_eq!(ledger.count_accepted(), 3);
        assert!(ledger.count_accepted() <= ledger.total());
    }

    #[test]
    fn closed_slots_reject_automatic_input() {
        let mut ledger = AttestationLedger::new(3);
        assert_eq!(
            ledger
                .receive(code("a"), CodeInputType::Automatic, None)
                .unwrap_err(),
            LedgerError::NoOpenSlot
        );
        ledger.open_slots();
        assert!(ledger.receive(code("a"), CodeInputType::Automatic, None).is_ok());
    }
}

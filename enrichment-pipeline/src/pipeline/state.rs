use state_machines::state_machine;

// Failure is not a machine state: a stage error drops the typed machine and
// propagates through `Result`, so no transition out of an error is even
// representable.
state_machine! {
    name: EnrichmentMachine,
    state: EnrichmentState,
    initial: Received,
    states: [Received, Decoded, DuplicateChecked, Retrieved, LlmCalled, Normalized, Committed],
    events {
        decode { transition: { from: Received, to: Decoded } }
        check_duplicate { transition: { from: Decoded, to: DuplicateChecked } }
        retrieve { transition: { from: DuplicateChecked, to: Retrieved } }
        call_llm { transition: { from: Retrieved, to: LlmCalled } }
        normalize { transition: { from: LlmCalled, to: Normalized } }
        commit { transition: { from: Normalized, to: Committed } }
    }
}

pub fn received() -> EnrichmentMachine<(), Received> {
    EnrichmentMachine::new(())
}

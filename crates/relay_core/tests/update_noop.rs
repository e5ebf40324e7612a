use relay_core::{update, DriverMsg, DriverState};

#[test]
fn update_is_noop() {
    let state = DriverState::new();
    let (next, effects) = update(state.clone(), DriverMsg::NoOp);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}

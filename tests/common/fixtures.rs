use serde_json::Value;
use pipeline_engine::channels::Channel;
use pipeline_engine::state::{StateSnapshot, RunState};

pub fn empty_snapshot() -> StateSnapshot {
    RunState::builder().build().snapshot()
}

pub fn empty_state() -> RunState {
    RunState::builder().build()
}

pub fn state_with_user(msg: &str) -> RunState {
    RunState::new_with_user_message(msg)
}

pub fn state_with_extra(pairs: &[(&str, Value)]) -> RunState {
    let mut st = empty_state();
    for (k, v) in pairs {
        st.extra.get_mut().insert((*k).into(), v.clone());
    }
    st
}

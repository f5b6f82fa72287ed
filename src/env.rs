use std::{cell::RefCell, ffi::OsStr, str::FromStr};

use log::warn;

/// Cycle budget for `weft run` when neither the flag nor the environment sets one.
pub const DEFAULT_CYCLE_LIMIT: u64 = 1_000_000;

#[derive(Clone, Copy)]
struct Env {
    cycle_limit: u64,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

pub fn init() {
    let value = Env {
        cycle_limit: var_parse("WEFT_CYCLE_LIMIT").unwrap_or(DEFAULT_CYCLE_LIMIT),
    };
    set_env(value);
}

pub fn cycle_limit() -> u64 {
    with_env(|env| env.cycle_limit)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_parse<T: FromStr>(name: impl AsRef<OsStr>) -> Option<T> {
    let name = name.as_ref();
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring {}: `{value}` is not a valid value", name.to_string_lossy());
            None
        }
    }
}

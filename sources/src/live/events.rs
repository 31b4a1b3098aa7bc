use regex::Regex;
use std::fmt;
use strum::{
    AsRefStr,
    Display,
    EnumIter,
    IntoEnumIterator as _,
};

/// Econ log lines worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Message,
    Kill,
    CapturedFlag,
    Join,
    Leave,
}

impl EventKind {
    /// Pattern searched for in a raw econ line.
    pub fn pattern(self) -> &'static str {
        match self {
            EventKind::Message => r"\[chat\]: .*",
            EventKind::Kill => r"\[game\]: kill killer=.*",
            EventKind::CapturedFlag => r"\[game\]: flag_capture player=.*",
            EventKind::Join => r"\[game\]: team_join player=.*",
            EventKind::Leave => r"\[game\]: leave player=.*",
        }
    }

    pub fn all() -> impl Iterator<Item = EventKind> {
        EventKind::iter()
    }
}

type Handler = Box<dyn Fn(&str) + Send + Sync>;

struct Subscription {
    pattern: Regex,
    handler: Handler,
}

/// Routes raw payloads to the handlers whose pattern matches them.
#[derive(Default)]
pub struct EventDispatcher {
    subscriptions: Vec<Subscription>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.subscriptions.iter().map(|subscription| subscription.pattern.as_str()))
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, pattern: &str, handler: impl Fn(&str) + Send + Sync + 'static) -> Result<(), regex::Error> {
        self.subscriptions.push(Subscription {
            pattern: Regex::new(pattern)?,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Calls every matching handler, returns how many were called. Payloads
    /// nobody subscribed to are dropped.
    pub fn dispatch(&self, payload: &str) -> usize {
        self.subscriptions
            .iter()
            .filter(|subscription| subscription.pattern.is_match(payload))
            .map(|subscription| (subscription.handler)(payload))
            .count()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

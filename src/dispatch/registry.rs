use heliograph_types::{ChannelId, GuildId};
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::fmt::Debug;

/// Entity a delivery is ordered against.
///
/// Deliveries sharing a key run strictly in submission order and never
/// overlap; deliveries for different keys have no ordering relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    /// Process-wide ordering for events that belong to no entity.
    Global,

    /// Events scoped to one guild.
    Guild(GuildId),

    /// Events scoped to a guild-less channel, such as direct messages.
    Channel(ChannelId),
}

/// One listener invocation produced by a packet handler.
pub struct Delivery {
    pub(crate) key: DispatchKey,
    pub(crate) run: Box<dyn FnOnce() + Send + 'static>,
}

impl Delivery {
    #[must_use]
    pub fn new(key: DispatchKey, run: impl FnOnce() + Send + 'static) -> Self {
        Self {
            key,
            run: Box::new(run),
        }
    }

    /// Entity this delivery is ordered against.
    #[must_use]
    pub const fn key(&self) -> DispatchKey {
        self.key
    }
}

impl Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Turns one decoded dispatch payload into the listener deliveries it
/// causes, mutating whatever collaborator state it closes over along the
/// way.
///
/// Handlers receive the raw `d` payload of the envelope; decoding it is
/// their business since this crate does not model every event shape. A
/// handler returning no deliveries is perfectly normal (the event only
/// updated caches nobody listens to).
pub trait PacketHandler: Send + Sync {
    fn handle(&self, data: &RawValue) -> Result<Vec<Delivery>, serde_json::Error>;
}

impl<F> PacketHandler for F
where
    F: Fn(&RawValue) -> Result<Vec<Delivery>, serde_json::Error> + Send + Sync,
{
    fn handle(&self, data: &RawValue) -> Result<Vec<Delivery>, serde_json::Error> {
        (self)(data)
    }
}

/// Maps dispatch event type tags (`MESSAGE_CREATE`, `GUILD_UPDATE`, ...)
/// to their packet handlers.
///
/// Events with no registered handler are logged and dropped by the
/// client, which keeps a connection forward-compatible with event types
/// this build does not know about.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Box<str>, Box<dyn PacketHandler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler invoked for dispatch events tagged `kind`,
    /// replacing a previously registered one.
    pub fn register(&mut self, kind: impl Into<Box<str>>, handler: impl PacketHandler + 'static) {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    /// Removes the handler for `kind`, if any.
    pub fn unregister(&mut self, kind: &str) {
        self.handlers.remove(kind);
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&dyn PacketHandler> {
        self.handlers.get(kind).map(|handler| &**handler)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{Delivery, DispatchKey, HandlerRegistry, PacketHandler};
    use serde_json::value::RawValue;

    #[test]
    fn closures_can_be_registered_as_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register("MESSAGE_CREATE", |_data: &RawValue| {
            Ok(vec![Delivery::new(DispatchKey::Global, || {})])
        });

        assert_eq!(registry.len(), 1);

        let data = RawValue::from_string("{}".to_string()).expect("valid json");
        let handler = registry.get("MESSAGE_CREATE").expect("registered");
        let deliveries = handler.handle(&data).expect("should handle");

        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].key(), DispatchKey::Global);
        assert!(registry.get("MESSAGE_DELETE").is_none());
    }

    #[test]
    fn registering_twice_replaces_the_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register("TYPING_START", |_: &RawValue| Ok(Vec::new()));
        registry.register("TYPING_START", |_: &RawValue| {
            Ok(vec![Delivery::new(DispatchKey::Global, || {})])
        });
        assert_eq!(registry.len(), 1);

        let data = RawValue::from_string("{}".to_string()).expect("valid json");
        let deliveries = registry
            .get("TYPING_START")
            .expect("registered")
            .handle(&data)
            .expect("should handle");
        assert_eq!(deliveries.len(), 1);

        registry.unregister("TYPING_START");
        assert!(registry.is_empty());
    }
}

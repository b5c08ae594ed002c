// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client-application callable, middleware mods, and the app registry.

use fed_record::RecordSet;
use fed_task::Message;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-node state carried into every client-application invocation.
///
/// The `state` record set is durable: the engine persists it after each
/// task and hands it back on the node's next task in the same run.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// Run the task belongs to.
    pub run_id: u64,
    /// The node executing the task.
    pub node_id: u64,
    /// Durable per-node state.
    pub state: RecordSet,
}

impl Context {
    /// Create a context with empty state.
    #[must_use]
    pub fn new(run_id: u64, node_id: u64) -> Self {
        Self {
            run_id,
            node_id,
            state: RecordSet::new(),
        }
    }
}

/// The callable surface of a client application: `app(message, context) →
/// message`.
///
/// Implementations run inside an isolated executor and may block; the
/// engine never calls them on its scheduler threads.
pub trait ClientAppCallable: Send + Sync {
    /// Handle one incoming message, mutating the context as needed.
    ///
    /// # Errors
    ///
    /// Any error is reported as an execution failure for this task; it
    /// never poisons the executor.
    fn call(&self, message: Message, context: &mut Context) -> anyhow::Result<Message>;
}

impl<F> ClientAppCallable for F
where
    F: Fn(Message, &mut Context) -> anyhow::Result<Message> + Send + Sync,
{
    fn call(&self, message: Message, context: &mut Context) -> anyhow::Result<Message> {
        self(message, context)
    }
}

/// Middleware wrapping the client-application callable.
///
/// Mods compose in declared order around the base app; each receives the
/// incoming message and a handle to the rest of the chain. Side effects
/// (telemetry) are fine; message semantics must be preserved.
pub trait Mod: Send + Sync {
    /// Process `message`, usually by delegating to `next`.
    ///
    /// # Errors
    ///
    /// Propagated like an application error.
    fn call(
        &self,
        message: Message,
        context: &mut Context,
        next: &dyn ClientAppCallable,
    ) -> anyhow::Result<Message>;
}

/// A client application: a base callable plus its mod chain.
pub struct ClientApp {
    base: Arc<dyn ClientAppCallable>,
    mods: Vec<Arc<dyn Mod>>,
}

impl ClientApp {
    /// Wrap a base callable with no mods.
    #[must_use]
    pub fn new(base: Arc<dyn ClientAppCallable>) -> Self {
        Self {
            base,
            mods: Vec::new(),
        }
    }

    /// Append a mod; the first appended mod is the outermost wrapper.
    #[must_use]
    pub fn with_mod(mut self, r#mod: Arc<dyn Mod>) -> Self {
        self.mods.push(r#mod);
        self
    }
}

/// The tail of a mod chain: remaining mods around the base callable.
struct Chain<'a> {
    mods: &'a [Arc<dyn Mod>],
    base: &'a dyn ClientAppCallable,
}

impl ClientAppCallable for Chain<'_> {
    fn call(&self, message: Message, context: &mut Context) -> anyhow::Result<Message> {
        match self.mods.split_first() {
            Some((head, rest)) => head.call(
                message,
                context,
                &Chain {
                    mods: rest,
                    base: self.base,
                },
            ),
            None => self.base.call(message, context),
        }
    }
}

impl ClientAppCallable for ClientApp {
    fn call(&self, message: Message, context: &mut Context) -> anyhow::Result<Message> {
        Chain {
            mods: &self.mods,
            base: self.base.as_ref(),
        }
        .call(message, context)
    }
}

/// Builds a fresh client-application instance for one actor.
pub type AppFactory = Arc<dyn Fn() -> Arc<dyn ClientAppCallable> + Send + Sync>;

/// Maps opaque load paths to client-application factories.
///
/// Each actor resolves its path once and caches the built instance, so
/// applications are loaded once per actor and never shared between them.
#[derive(Default)]
pub struct ClientAppRegistry {
    factories: HashMap<String, AppFactory>,
}

impl ClientAppRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `path`, replacing any previous entry.
    pub fn register(
        &mut self,
        path: impl Into<String>,
        factory: impl Fn() -> Arc<dyn ClientAppCallable> + Send + Sync + 'static,
    ) {
        self.factories.insert(path.into(), Arc::new(factory));
    }

    /// Look up the factory registered under `path`.
    #[must_use]
    pub fn load(&self, path: &str) -> Option<AppFactory> {
        self.factories.get(path).cloned()
    }

    /// Check whether `path` is registered.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.factories.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_task::{MessageType, Metadata};
    use uuid::Uuid;

    fn message() -> Message {
        Message::new(
            Metadata {
                run_id: 1,
                message_id: Uuid::new_v4(),
                group_id: "g".into(),
                src_node_id: 0,
                dst_node_id: 1,
                ttl: None,
                message_type: MessageType::Fit,
            },
            RecordSet::new(),
        )
    }

    /// Tags the context with its name before and after delegating.
    struct TraceMod(&'static str);

    impl Mod for TraceMod {
        fn call(
            &self,
            message: Message,
            context: &mut Context,
            next: &dyn ClientAppCallable,
        ) -> anyhow::Result<Message> {
            let mut rec = fed_record::ConfigsRecord::new();
            rec.insert("enter", self.0);
            context.state.configs_records.insert(format!("enter.{}", self.0), rec);
            let out = next.call(message, context)?;
            let mut rec = fed_record::ConfigsRecord::new();
            rec.insert("exit", self.0);
            context.state.configs_records.insert(format!("exit.{}", self.0), rec);
            Ok(out)
        }
    }

    #[test]
    fn mods_wrap_in_declared_order() {
        let base: Arc<dyn ClientAppCallable> = Arc::new(
            |msg: Message, ctx: &mut Context| -> anyhow::Result<Message> {
                // The outer mod has already run by the time the base sees
                // the call.
                assert!(ctx.state.configs_records.contains_key("enter.outer"));
                assert!(ctx.state.configs_records.contains_key("enter.inner"));
                Ok(msg.reply(RecordSet::new()))
            },
        );
        let app = ClientApp::new(base)
            .with_mod(Arc::new(TraceMod("outer")))
            .with_mod(Arc::new(TraceMod("inner")));

        let mut ctx = Context::new(1, 1);
        let reply = app.call(message(), &mut ctx).unwrap();
        assert_eq!(reply.metadata.src_node_id, 1);
        assert!(ctx.state.configs_records.contains_key("exit.outer"));
        assert!(ctx.state.configs_records.contains_key("exit.inner"));
    }

    #[test]
    fn registry_builds_independent_instances() {
        let mut registry = ClientAppRegistry::new();
        registry.register("demo.app", || {
            Arc::new(|msg: Message, _ctx: &mut Context| -> anyhow::Result<Message> { Ok(msg) })
        });
        assert!(registry.contains("demo.app"));
        let factory = registry.load("demo.app").unwrap();
        let a = factory();
        let b = factory();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(registry.load("other.app").is_none());
    }
}

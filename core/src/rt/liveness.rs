//! Script/instance liveness registry.
//!
//! A suspended call must notice when its owning script or bound instance is
//! torn down between suspension and resume. Instead of intrusive membership
//! lists threaded through the script objects, this is an owning registry
//! behind one global mutex: scripts and instances register on creation and
//! unregister on teardown, and each suspension attaches its state handle to
//! both owners. Handles come from a global counter and are never reused, so
//! a stale handle can never alias a newer owner.
//!
//! Every membership query and mutation happens under the single mutex; that
//! lock is the only thing serializing concurrent resume attempts.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;

use crate::util::fast_map::{FastHashMap, FastHashSet, fast_hash_map_new};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

#[inline]
fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

#[derive(Default)]
pub struct LivenessRegistry {
    scripts: FastHashMap<u64, FastHashSet<u64>>,
    instances: FastHashMap<u64, FastHashSet<u64>>,
}

impl LivenessRegistry {
    pub fn register_script(&mut self) -> ScriptId {
        let id = next_handle();
        self.scripts.insert(id, FastHashSet::default());
        ScriptId(id)
    }

    /// Script teardown: every state attached to it becomes invalid at once.
    pub fn unregister_script(&mut self, script: ScriptId) {
        self.scripts.remove(&script.0);
    }

    pub fn register_instance(&mut self) -> InstanceId {
        let id = next_handle();
        self.instances.insert(id, FastHashSet::default());
        InstanceId(id)
    }

    pub fn unregister_instance(&mut self, instance: InstanceId) {
        self.instances.remove(&instance.0);
    }

    pub fn script_alive(&self, script: ScriptId) -> bool {
        self.scripts.contains_key(&script.0)
    }

    pub fn instance_alive(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(&instance.0)
    }

    pub(crate) fn new_state_id(&mut self) -> StateId {
        StateId(next_handle())
    }

    /// Attach a suspension to its owners. A no-op for an owner that is
    /// already gone; the state is then simply never considered live.
    pub(crate) fn attach(&mut self, state: StateId, script: ScriptId, instance: Option<InstanceId>) {
        if let Some(states) = self.scripts.get_mut(&script.0) {
            states.insert(state.0);
        }
        if let Some(instance) = instance
            && let Some(states) = self.instances.get_mut(&instance.0)
        {
            states.insert(state.0);
        }
    }

    /// Detach from both owners. No-op where already detached.
    pub(crate) fn detach(&mut self, state: StateId, script: ScriptId, instance: Option<InstanceId>) {
        if let Some(states) = self.scripts.get_mut(&script.0) {
            states.remove(&state.0);
        }
        if let Some(instance) = instance
            && let Some(states) = self.instances.get_mut(&instance.0)
        {
            states.remove(&state.0);
        }
    }

    /// Membership of a state in (script table, instance table). A state
    /// with no bound instance always passes the instance side.
    pub(crate) fn attached(&self, state: StateId, script: ScriptId, instance: Option<InstanceId>) -> (bool, bool) {
        let script_ok = self
            .scripts
            .get(&script.0)
            .is_some_and(|states| states.contains(&state.0));
        let instance_ok = match instance {
            Some(instance) => self
                .instances
                .get(&instance.0)
                .is_some_and(|states| states.contains(&state.0)),
            None => true,
        };
        (script_ok, instance_ok)
    }
}

static REGISTRY: Lazy<Mutex<LivenessRegistry>> = Lazy::new(|| {
    Mutex::new(LivenessRegistry {
        scripts: fast_hash_map_new(),
        instances: fast_hash_map_new(),
    })
});

/// Run `f` with the global registry locked.
pub fn with_registry<F, R>(f: F) -> R
where
    F: FnOnce(&mut LivenessRegistry) -> R,
{
    let mut registry = REGISTRY.lock().unwrap();
    f(&mut registry)
}

pub fn register_script() -> ScriptId {
    with_registry(|reg| reg.register_script())
}

pub fn unregister_script(script: ScriptId) {
    with_registry(|reg| reg.unregister_script(script));
}

pub fn register_instance() -> InstanceId {
    with_registry(|reg| reg.register_instance())
}

pub fn unregister_instance(instance: InstanceId) {
    with_registry(|reg| reg.unregister_instance(instance));
}

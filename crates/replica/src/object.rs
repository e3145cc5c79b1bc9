use std::fmt;
use std::sync::Arc;

use crate::behaviour::NetworkBehaviour;
use crate::transport::{Role, Transport};
use crate::variable::{SharedVariable, same_variable};

/// Server-assigned object id. Positive, never reused within a session.
pub type NetworkId = i32;
/// Key into the prefab registry, shared by every participant.
pub type PrefabId = i32;

/// A replicated entity: an ordered list of variables and the behaviours that own them.
///
/// Objects are built unbound by a prefab factory; the manager assigns the
/// ids and attaches every behaviour before the object becomes visible.
pub struct NetworkObject {
    network_id: NetworkId,
    prefab_id: PrefabId,
    variables: Vec<SharedVariable>,
    behaviours: Vec<Box<dyn NetworkBehaviour>>,
    is_local_player: bool,
    role: Option<Role>,
}

impl fmt::Debug for NetworkObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkObject")
            .field("network_id", &self.network_id)
            .field("prefab_id", &self.prefab_id)
            .field("variables", &self.variables.len())
            .field("behaviours", &self.behaviours.len())
            .field("is_local_player", &self.is_local_player)
            .field("role", &self.role)
            .finish()
    }
}

impl Default for NetworkObject {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkObject {
    pub fn new() -> Self {
        Self {
            network_id: 0,
            prefab_id: 0,
            variables: Vec::new(),
            behaviours: Vec::new(),
            is_local_player: false,
            role: None,
        }
    }

    /// Builder form of `add_behaviour`, convenient inside prefab factories.
    pub fn with_behaviour(mut self, behaviour: impl NetworkBehaviour) -> Self {
        self.add_behaviour(behaviour);
        self
    }

    /// Appends a behaviour and registers its declared variables in order.
    /// Returns the behaviour index.
    pub fn add_behaviour(&mut self, behaviour: impl NetworkBehaviour) -> usize {
        let index = self.behaviours.len();
        let mut behaviour: Box<dyn NetworkBehaviour> = Box::new(behaviour);
        behaviour.link_mut().set_index(index);
        behaviour.link_mut().set_local_player(self.is_local_player);
        for variable in behaviour.network_variables() {
            self.register_variable(variable);
        }
        self.behaviours.push(behaviour);
        index
    }

    /// Appends `variable` unless the same variable is already registered.
    /// Returns whether it was added.
    pub fn register_variable(&mut self, variable: SharedVariable) -> bool {
        if self.variables.iter().any(|v| same_variable(v, &variable)) {
            return false;
        }
        self.variables.push(variable);
        true
    }

    pub fn count_dirty_variables(&self) -> usize {
        self.variables.iter().filter(|v| v.is_dirty()).count()
    }

    pub fn clear_all_dirty_variables(&self) {
        for variable in &self.variables {
            variable.clear_dirty();
        }
    }

    /// Clears every dirty flag in one pass and returns the indices that were set.
    /// A variable changed after its flag was taken is dirty again for the next pass.
    pub fn take_dirty_indices(&self) -> Vec<usize> {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.take_dirty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn mark_dirty(&self, indices: &[usize]) {
        for variable in indices.iter().filter_map(|&i| self.variables.get(i)) {
            variable.mark_dirty();
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn prefab_id(&self) -> PrefabId {
        self.prefab_id
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_local_player(&self) -> bool {
        self.is_local_player
    }

    pub fn set_local_player(&mut self, local_player: bool) {
        self.is_local_player = local_player;
        for behaviour in &mut self.behaviours {
            behaviour.link_mut().set_local_player(local_player);
        }
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn variables(&self) -> &[SharedVariable] {
        &self.variables
    }

    pub fn variable(&self, index: usize) -> Option<&SharedVariable> {
        self.variables.get(index)
    }

    pub fn behaviour_count(&self) -> usize {
        self.behaviours.len()
    }

    pub fn behaviour_dyn(&self, index: usize) -> Option<&dyn NetworkBehaviour> {
        self.behaviours.get(index).map(|b| &**b)
    }

    pub fn behaviour_dyn_mut(&mut self, index: usize) -> Option<&mut (dyn NetworkBehaviour + 'static)> {
        self.behaviours.get_mut(index).map(|b| &mut **b)
    }

    /// The behaviour at `index`, if it is a `B`.
    pub fn behaviour<B: NetworkBehaviour>(&self, index: usize) -> Option<&B> {
        self.behaviour_dyn(index)?.as_any().downcast_ref::<B>()
    }

    pub fn behaviour_mut<B: NetworkBehaviour>(&mut self, index: usize) -> Option<&mut B> {
        self.behaviour_dyn_mut(index)?.as_any_mut().downcast_mut::<B>()
    }

    /// First behaviour of type `B`, wherever it sits.
    pub fn find_behaviour<B: NetworkBehaviour>(&self) -> Option<&B> {
        self.behaviours
            .iter()
            .find_map(|b| (**b).as_any().downcast_ref::<B>())
    }

    pub fn find_behaviour_mut<B: NetworkBehaviour>(&mut self) -> Option<&mut B> {
        self.behaviours
            .iter_mut()
            .find_map(|b| (**b).as_any_mut().downcast_mut::<B>())
    }

    pub(crate) fn bind(
        &mut self,
        network_id: NetworkId,
        prefab_id: PrefabId,
        role: Role,
        transport: Arc<dyn Transport>,
        buffer_capacity: usize,
    ) {
        self.network_id = network_id;
        self.prefab_id = prefab_id;
        self.role = Some(role);
        for behaviour in &mut self.behaviours {
            behaviour
                .link_mut()
                .attach(network_id, role, Arc::clone(&transport), buffer_capacity);
        }
    }
}

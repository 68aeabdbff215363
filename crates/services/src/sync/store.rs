use progress_core::model::ProgressTree;
use tokio::sync::watch;

/// Owner of the client's progress tree.
///
/// All reads and writes go through these methods. Every committed mutation
/// notifies subscribers.
#[derive(Debug)]
pub struct ProgressStore {
    tree: watch::Sender<ProgressTree>,
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(ProgressTree::new())
    }
}

impl ProgressStore {
    #[must_use]
    pub fn new(tree: ProgressTree) -> Self {
        let (tree, _) = watch::channel(tree);
        Self { tree }
    }

    /// Cloned snapshot of the whole tree.
    #[must_use]
    pub fn get(&self) -> ProgressTree {
        self.tree.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ProgressTree) -> R) -> R {
        f(&self.tree.borrow())
    }

    /// Apply `f` under the store lock, then notify subscribers.
    pub fn mutate(&self, f: impl FnOnce(&mut ProgressTree)) {
        self.tree.send_modify(f);
    }

    pub fn replace(&self, tree: ProgressTree) {
        self.tree.send_replace(tree);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressTree> {
        self.tree.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{ItemType, RoleId, YearId};
    use progress_core::time::fixed_now;

    #[tokio::test]
    async fn mutations_notify_subscribers() {
        let store = ProgressStore::default();
        let mut rx = store.subscribe();
        let role_id = RoleId::new("frontend").unwrap();

        store.mutate(|tree| {
            tree.role_entry(role_id.clone())
                .year_entry(YearId::new("0-1").unwrap(), fixed_now())
                .set_item(ItemType::Skills, 0, true, fixed_now());
        });

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen, store.get());
        assert!(store.read(|tree| tree.role(&role_id).is_some()));
    }

    #[test]
    fn replace_swaps_the_whole_tree() {
        let store = ProgressStore::default();
        store.mutate(|tree| {
            tree.role_entry(RoleId::new("frontend").unwrap());
        });
        store.replace(ProgressTree::new());
        assert!(store.read(ProgressTree::is_empty));
    }
}

//! In-memory stand-ins for the store and the kernel primitives, shared by
//! the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::io;

use crate::loader::{DriverRuntime, LoadOutcome};
use crate::store::KeyStore;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    U32(u32),
    ExpandSz(String),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Node {
    values: BTreeMap<String, Value>,
    children: BTreeMap<String, Node>,
}

/// In-memory hierarchical key store with scripted failure points.
///
/// Keys are the full path (`String`), re-resolved on every operation, which
/// naturally models the store mutating underneath an open handle.
#[derive(Default)]
pub struct MemStore {
    root: RefCell<Node>,
    denied_deletes: RefCell<Vec<String>>,
    denied_creates: RefCell<Vec<String>>,
    failing_sets: RefCell<Vec<(String, String)>>,
    /// Children reported once by enumeration but absent from the tree.
    phantoms: RefCell<Vec<(String, String)>>,
    delete_calls: Cell<usize>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }

    pub fn mkdirs(&self, path: &str) {
        let mut root = self.root.borrow_mut();
        let mut node = &mut *root;

        for part in path.split('\\') {
            node = node.children.entry(part.to_owned()).or_default();
        }
    }

    pub fn deny_delete(&self, path: &str) {
        self.denied_deletes.borrow_mut().push(path.to_owned());
    }

    pub fn deny_create(&self, path: &str) {
        self.denied_creates.borrow_mut().push(path.to_owned());
    }

    pub fn fail_set(&self, path: &str, value_name: &str) {
        self.failing_sets
            .borrow_mut()
            .push((path.to_owned(), value_name.to_owned()));
    }

    pub fn add_phantom_child(&self, path: &str, child: &str) {
        self.phantoms
            .borrow_mut()
            .push((path.to_owned(), child.to_owned()));
    }

    pub fn key_exists(&self, path: &str) -> bool {
        self.with_node(path, |_| ()).is_some()
    }

    pub fn value(&self, path: &str, name: &str) -> Option<Value> {
        self.with_node(path, |node| node.values.get(name).cloned())
            .flatten()
    }

    pub fn snapshot(&self) -> Node {
        self.root.borrow().clone()
    }

    pub fn deletes_attempted(&self) -> usize {
        self.delete_calls.get()
    }

    fn with_node<T>(&self, path: &str, f: impl FnOnce(&Node) -> T) -> Option<T> {
        let root = self.root.borrow();
        let mut node = &*root;

        for part in path.split('\\') {
            node = node.children.get(part)?;
        }

        Some(f(node))
    }

    fn not_found() -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, "key not found")
    }

    fn denied() -> io::Error {
        io::Error::new(io::ErrorKind::PermissionDenied, "access denied")
    }
}

impl KeyStore for MemStore {
    type Key = String;

    fn create(&self, path: &str) -> io::Result<String> {
        if self.denied_creates.borrow().iter().any(|p| p == path) {
            return Err(Self::denied());
        }

        self.mkdirs(path);

        Ok(path.to_owned())
    }

    fn open(&self, path: &str) -> io::Result<String> {
        if self.key_exists(path) {
            Ok(path.to_owned())
        } else {
            Err(Self::not_found())
        }
    }

    fn set_u32(&self, key: &String, name: &str, value: u32) -> io::Result<()> {
        self.set(key, name, Value::U32(value))
    }

    fn set_expand_sz(&self, key: &String, name: &str, value: &str) -> io::Result<()> {
        self.set(key, name, Value::ExpandSz(value.to_owned()))
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        self.delete_calls.set(self.delete_calls.get() + 1);

        if self.denied_deletes.borrow().iter().any(|p| p == path) {
            return Err(Self::denied());
        }

        let has_children = self
            .with_node(path, |node| !node.children.is_empty())
            .ok_or_else(Self::not_found)?;

        let has_phantoms = self.phantoms.borrow().iter().any(|(p, _)| p == path);

        if has_children || has_phantoms {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "key has child keys",
            ));
        }

        let (parent, leaf) = match path.rsplit_once('\\') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, path),
        };

        let mut root = self.root.borrow_mut();
        let node = match parent {
            None => &mut *root,
            Some(parent) => {
                let mut node = &mut *root;
                for part in parent.split('\\') {
                    node = node.children.get_mut(part).ok_or_else(Self::not_found)?;
                }
                node
            }
        };

        node.children
            .remove(leaf)
            .map(|_| ())
            .ok_or_else(Self::not_found)
    }

    fn first_child(&self, key: &String) -> io::Result<Option<String>> {
        // A scripted phantom is consumed on read, modeling a child another
        // process removed between enumeration and deletion.
        let mut phantoms = self.phantoms.borrow_mut();

        if let Some(pos) = phantoms.iter().position(|(p, _)| p == key) {
            return Ok(Some(phantoms.remove(pos).1));
        }

        drop(phantoms);

        self.with_node(key, |node| node.children.keys().next().cloned())
            .ok_or_else(Self::not_found)
    }
}

impl MemStore {
    fn set(&self, path: &str, name: &str, value: Value) -> io::Result<()> {
        if self
            .failing_sets
            .borrow()
            .iter()
            .any(|(p, n)| p == path && n == name)
        {
            return Err(Self::denied());
        }

        let mut root = self.root.borrow_mut();
        let mut node = &mut *root;

        for part in path.split('\\') {
            node = node.children.get_mut(part).ok_or_else(Self::not_found)?;
        }

        node.values.insert(name.to_owned(), value);

        Ok(())
    }
}

/// Kernel load/unload primitive with scripted outcomes and a call log.
#[derive(Default)]
pub struct StubRuntime {
    load_outcomes: RefCell<VecDeque<LoadOutcome>>,
    unload_outcomes: RefCell<VecDeque<Result<(), i32>>>,
    calls: RefCell<Vec<&'static str>>,
}

impl StubRuntime {
    pub fn new() -> Self {
        StubRuntime::default()
    }

    pub fn push_load(&self, outcome: LoadOutcome) {
        self.load_outcomes.borrow_mut().push_back(outcome);
    }

    pub fn push_unload(&self, outcome: Result<(), i32>) {
        self.unload_outcomes.borrow_mut().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }
}

impl DriverRuntime for StubRuntime {
    fn load(&self, _service_key: &str) -> LoadOutcome {
        self.calls.borrow_mut().push("load");

        self.load_outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(LoadOutcome::Failed(-1))
    }

    fn unload(&self, _service_key: &str) -> Result<(), i32> {
        self.calls.borrow_mut().push("unload");

        self.unload_outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(-1))
    }
}

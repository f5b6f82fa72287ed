// TODO(feat): Keep sorted, so lookups can binary search
#[derive(Debug, Default)]
pub struct Breakpoints(Vec<Breakpoint>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub address: u16,
    /// Label the breakpoint was set through, if any
    pub label: Option<String>,
}

impl Breakpoint {
    pub fn at(address: u16) -> Self {
        Breakpoint {
            address,
            label: None,
        }
    }

    /// A breakpoint set through the label `label`, which resolved to `address`.
    pub fn labeled(address: u16, label: impl Into<String>) -> Self {
        Breakpoint {
            address,
            label: Some(label.into()),
        }
    }
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: u16) -> Option<&Breakpoint> {
        self.0.iter().find(|breakpoint| breakpoint.address == address)
    }

    pub fn contains(&self, address: u16) -> bool {
        self.get(address).is_some()
    }

    /// Returns false if a breakpoint already exists at that address.
    pub fn insert(&mut self, breakpoint: Breakpoint) -> bool {
        if self.contains(breakpoint.address) {
            return false;
        }
        self.0.push(breakpoint);
        true
    }

    /// Removes every breakpoint with given address
    ///
    /// Returns whether any breakpoint was found with given address
    pub fn remove(&mut self, address: u16) -> bool {
        let initial_len = self.0.len();
        self.0.retain(|breakpoint| breakpoint.address != address);
        initial_len != self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.0.iter()
    }
}

impl From<Vec<Breakpoint>> for Breakpoints {
    fn from(vec: Vec<Breakpoint>) -> Self {
        let mut breakpoints = Self::new();
        for breakpoint in vec {
            breakpoints.insert(breakpoint);
        }
        breakpoints
    }
}

impl<'a> IntoIterator for &'a Breakpoints {
    type Item = &'a Breakpoint;
    type IntoIter = std::slice::Iter<'a, Breakpoint>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_and_remove() {
        let mut breakpoints = Breakpoints::from(vec![Breakpoint::at(0x10), Breakpoint::at(0x10)]);
        assert_eq!(breakpoints.len(), 1);
        assert!(breakpoints.insert(Breakpoint::at(0x20)));
        assert!(breakpoints.contains(0x20));
        assert!(breakpoints.remove(0x10));
        assert!(!breakpoints.remove(0x10));
        assert_eq!(breakpoints.iter().count(), 1);
    }

    #[test]
    fn labeled_breakpoint_keeps_its_label() {
        let mut breakpoints = Breakpoints::new();
        assert!(breakpoints.insert(Breakpoint::labeled(0x0006, "again")));
        // Same address through a literal is a duplicate
        assert!(!breakpoints.insert(Breakpoint::at(0x0006)));
        let found = breakpoints.get(0x0006).unwrap();
        assert_eq!(found.label.as_deref(), Some("again"));
        assert_eq!(breakpoints.get(0x0007), None);
    }
}

//! Traversal process: steps, predicates, the builder and validated plans

pub mod step;
pub mod traversal;

pub use step::{Order, ResultShape, Step, P};
pub use traversal::{By, GraphTraversalSource, Ids, Names, Traversal, TraversalPlan};

/// Anonymous traversals (Gremlin's `__`), used as `repeat()` bodies
pub mod anonymous {
    use super::{Names, Traversal, P};

    pub fn out(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().out(labels)
    }

    pub fn in_(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().in_(labels)
    }

    pub fn both(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().both(labels)
    }

    pub fn out_e(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().out_e(labels)
    }

    pub fn in_e(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().in_e(labels)
    }

    pub fn both_e(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().both_e(labels)
    }

    pub fn in_v() -> Traversal {
        Traversal::anonymous().in_v()
    }

    pub fn out_v() -> Traversal {
        Traversal::anonymous().out_v()
    }

    pub fn has_label(labels: impl Into<Names>) -> Traversal {
        Traversal::anonymous().has_label(labels)
    }

    pub fn has(key: impl Into<String>, predicate: impl Into<P>) -> Traversal {
        Traversal::anonymous().has(key, predicate)
    }

    pub fn dedup() -> Traversal {
        Traversal::anonymous().dedup()
    }
}

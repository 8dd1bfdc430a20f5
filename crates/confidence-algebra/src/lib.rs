#![forbid(unsafe_code)]

//! Confidence & Compliance Algebra.
//!
//! Models uncertainty as Jøsang Subjective Logic opinions `(belief,
//! disbelief, uncertainty, base_rate)`, extends them with a GDPR
//! compliance reinterpretation (lawfulness, violation, uncertainty) and
//! regulatory-event operators, and builds a cross-document graph-merge
//! and point-in-time query layer on top.
//!
//! This crate re-exports the public surface of each component crate
//! under its own module so downstream consumers depend on one crate
//! instead of wiring up the workspace themselves. Each module's
//! documentation lives on the originating crate; see `ca-types` for the
//! `Opinion` quadruple at the root of everything else here.

pub mod adapters {
    pub use ca_adapters::*;
}

pub mod algebra {
    pub use ca_algebra::*;
}

pub mod compliance {
    pub use ca_compliance::*;
}

pub mod decay {
    pub use ca_decay::*;
}

pub mod facade {
    pub use ca_facade::*;
}

pub mod inference {
    pub use ca_inference::*;
}

pub mod merge {
    pub use ca_merge::*;
}

pub mod temporal {
    pub use ca_temporal::*;
}

pub mod types {
    pub use ca_types::*;
}

// The opinion core and its operators are reached for on nearly every
// call site; re-export them at the crate root so `confidence_algebra::Opinion`
// and `confidence_algebra::cumulative_fuse` work without a module path.
pub use ca_algebra::{
    AlgebraError, averaging_fuse, conflict_metric, cumulative_fuse, deduce, pairwise_conflict, robust_fuse,
    trust_discount,
};
pub use ca_types::{Opinion, OpinionError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_reexports_are_usable_without_module_paths() {
        let a = Opinion::new(0.7, 0.1, 0.2, 0.5).unwrap();
        let b = Opinion::new(0.5, 0.3, 0.2, 0.5).unwrap();
        let fused = cumulative_fuse(&[a, b]).unwrap();
        assert!((fused.belief() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn submodules_expose_the_full_component_surface() {
        let opinion = types::Opinion::vacuous();
        let compliance = compliance::ComplianceOpinion::from_opinion(opinion);
        assert_eq!(compliance.uncertainty(), 1.0);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Link-time collected declarations of tracing targets

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target as declared by [`crate::trace_target!`] or [`crate::custom_target!`].
#[derive(Debug)]
pub struct TargetDecl {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

impl TargetDecl {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static DECLARED_TARGETS: [TargetDecl];

#[doc(hidden)]
#[macro_export]
macro_rules! target_decl_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{DECLARED_TARGETS, TargetDecl};
    };
}

/// Declare the calling module as a tracing target with a short name, a default level
/// and a set of tags. The name is always usable as a tag.
#[macro_export]
macro_rules! trace_target {
    // The declaration lives in its own const scope so that the macro can be invoked
    // more than once per crate without clashing static names.
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::target_decl_deps;
            target_decl_deps!();

            #[distributed_slice(DECLARED_TARGETS)]
            static DECL: TargetDecl = TargetDecl::new(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declare a target that is not a module path, e.g. a third-party crate name.
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::target_decl_deps;
            target_decl_deps!();

            #[distributed_slice(DECLARED_TARGETS)]
            static DECL: TargetDecl = TargetDecl::new($target, $target, $level, $tags);
        };
    };
}

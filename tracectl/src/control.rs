// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Runtime control of tracing levels.

use ordermap::{OrderMap, OrderSet};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{EnvFilter, Registry, prelude::*, reload};

use crate::LevelFilter;
use crate::display::TargetsByTag;
use crate::targets::DECLARED_TARGETS;
use crate::trace_target;

trace_target!("tracectl", LevelFilter::INFO, &[]);

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TraceCtlError {
    #[error("Invalid tracing directive '{0}': expected tag=level")]
    BadDirective(String),
    #[error("Invalid level '{0}'")]
    BadLevel(String),
    #[error("Failed to reload tracing filter: {0}")]
    Reload(String),
}

/// Configuration of a single target
#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: Vec<&'static str>,
}

impl TargetCfg {
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
    #[must_use]
    pub fn tags(&self) -> &[&'static str] {
        &self.tags
    }
}

#[derive(Debug)]
pub(crate) struct TargetDb {
    pub(crate) default: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetCfg>,
    pub(crate) tags: OrderMap<&'static str, OrderSet<&'static str>>,
}

impl TargetDb {
    fn from_declarations(default: LevelFilter) -> Self {
        let mut db = Self {
            default,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for decl in DECLARED_TARGETS {
            db.register(decl.target, decl.name, decl.level, decl.tags);
        }
        db
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        let mut all_tags = tags.to_vec();
        if !all_tags.contains(&name) {
            all_tags.push(name);
        }
        for tag in &all_tags {
            self.tags.entry(tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags: all_tags,
        };
        if self.targets.insert(target, cfg).is_some() {
            warn!("Tracing target {target} declared more than once");
        }
    }

    /// Set the level of every target carrying `tag`. Returns the number of targets changed.
    fn set_tag_level(&mut self, tag: &str, level: LevelFilter) -> usize {
        let Some(members) = self.tags.get(tag) else {
            return 0;
        };
        let mut changed = 0;
        for target in members {
            if let Some(cfg) = self.targets.get_mut(target)
                && cfg.level != level
            {
                cfg.level = level;
                changed += 1;
            }
        }
        changed
    }

    fn env_filter(&self) -> EnvFilter {
        self.targets
            .values()
            .filter_map(|cfg| {
                format!("{}={}", cfg.target, cfg.level)
                    .parse::<Directive>()
                    .ok()
            })
            .fold(EnvFilter::new(self.default.to_string()), |filter, directive| {
                filter.add_directive(directive)
            })
    }

    fn as_config_string(&self) -> String {
        self.targets
            .values()
            .fold(format!("default={}", self.default), |acc, cfg| {
                format!("{acc},{}={}", cfg.name, cfg.level)
            })
    }
}

/// Parse a comma-separated list of `tag=level` directives.
///
/// # Errors
///
/// Fails if a directive has no `=` or names an unknown level.
pub fn parse_directives(input: &str) -> Result<OrderMap<String, LevelFilter>, TraceCtlError> {
    let mut out = OrderMap::new();
    for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (tag, level) = item
            .split_once('=')
            .ok_or_else(|| TraceCtlError::BadDirective(item.to_string()))?;
        let level = LevelFilter::from_str(level.trim())
            .map_err(|_| TraceCtlError::BadLevel(level.trim().to_string()))?;
        out.insert(tag.trim().to_string(), level);
    }
    Ok(out)
}

#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetDb>,
    reload: Option<reload::Handle<EnvFilter, Registry>>,
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get the process-wide [`TracingControl`], installing the subscriber on first use.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetDb::from_declarations(LevelFilter::INFO);
        let (filter, handle) = reload::Layer::new(db.env_filter());
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_level(true);

        // Another subscriber may already be installed (e.g. by a test harness). In that
        // case levels are still tracked but cannot be applied.
        let reload = match tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            Ok(()) => Some(handle),
            Err(e) => {
                warn!("Tracing subscriber not installed: {e}");
                None
            }
        };
        Self {
            db: Mutex::new(db),
            reload,
        }
    }

    fn lock(&self) -> MutexGuard<'_, TargetDb> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, db: &TargetDb) -> Result<(), TraceCtlError> {
        match &self.reload {
            Some(handle) => handle
                .reload(db.env_filter())
                .map_err(|e| TraceCtlError::Reload(e.to_string())),
            None => Ok(()),
        }
    }

    pub fn set_default_level(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.lock();
        if db.default != level {
            db.default = level;
            info!("Default log level set to {level}");
            self.apply(&db)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.lock().default
    }

    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.lock();
        let changed = db.set_tag_level(tag, level);
        if changed > 0 {
            info!("Log level for tag '{tag}' set to {level} ({changed} targets)");
            self.apply(&db)?;
        }
        Ok(())
    }

    pub fn set_level_all(&self, level: LevelFilter) -> Result<(), TraceCtlError> {
        let mut db = self.lock();
        db.targets.values_mut().for_each(|cfg| cfg.level = level);
        self.apply(&db)
    }

    /// Apply a configuration such as `default=warn,all=info,frm=debug`.
    ///
    /// `default` sets the level for undeclared targets, `all` sets every declared target,
    /// anything else is a tag. Later directives override earlier ones.
    ///
    /// # Errors
    ///
    /// Fails if the string cannot be parsed or the filter cannot be reloaded.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TraceCtlError> {
        let directives = parse_directives(input)?;
        if let Some(level) = directives.get("default") {
            self.set_default_level(*level)?;
        }
        if let Some(level) = directives.get("all") {
            self.set_level_all(*level)?;
        }
        for (tag, level) in directives
            .iter()
            .filter(|(tag, _)| !matches!(tag.as_str(), "default" | "all"))
        {
            self.set_tag_level(tag, *level)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn target(&self, target: &str) -> Option<TargetCfg> {
        self.lock().targets.get(target).cloned()
    }

    #[must_use]
    pub fn targets_by_tag(&self, tag: &str) -> Vec<TargetCfg> {
        let db = self.lock();
        db.tags
            .get(tag)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|t| db.targets.get(t).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        self.lock().tags.keys().copied().collect()
    }

    #[must_use]
    pub fn as_config_string(&self) -> String {
        self.lock().as_config_string()
    }

    /// Render the targets grouped by tag
    #[must_use]
    pub fn dump_by_tag(&self) -> String {
        let db = self.lock();
        TargetsByTag(&db).to_string()
    }

    /// Render the target table
    #[must_use]
    pub fn dump(&self) -> String {
        self.lock().to_string()
    }
}

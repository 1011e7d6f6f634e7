//! Compiled script function.
//!
//! Holds what the execution core needs from the front end's output: the
//! instruction stream, constant and global-name pools, operator hints, the
//! per-function dispatch tables, the stack-debug log, and the lazily built
//! segment plan. The generic interpreter loop lives outside this crate and
//! re-enters through [`ResumeEntry`] when a suspended call is resumed.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::info;

use crate::rt::Capture;
use crate::val::Val;
use crate::vm::debug_info::StackEvent;
use crate::vm::dispatch::DispatchTables;
use crate::vm::segment::{self, OperatorHint, SegmentPlan};

/// Seam to the external interpreter loop: re-enter `function` with a
/// captured frame whose pending result and resume offset are filled in.
pub type ResumeEntry = Arc<dyn Fn(&ScriptFunction, &mut Capture) -> Val + Send + Sync>;

pub struct ScriptFunction {
    pub name: Arc<str>,
    pub source_path: Arc<str>,
    pub code: Vec<i32>,
    pub consts: Vec<Val>,
    pub global_names: Vec<Arc<str>>,
    pub operator_hints: Vec<OperatorHint>,
    pub stack_debug: Vec<StackEvent>,
    pub tables: Arc<DispatchTables>,
    pub entry: ResumeEntry,
    plan: OnceLock<Arc<SegmentPlan>>,
}

impl ScriptFunction {
    pub fn new(
        name: &str,
        source_path: &str,
        code: Vec<i32>,
        consts: Vec<Val>,
        tables: Arc<DispatchTables>,
        entry: ResumeEntry,
    ) -> ScriptFunction {
        ScriptFunction {
            name: Arc::from(name),
            source_path: Arc::from(source_path),
            code,
            consts,
            global_names: Vec::new(),
            operator_hints: Vec::new(),
            stack_debug: Vec::new(),
            tables,
            entry,
            plan: OnceLock::new(),
        }
    }

    /// Build (once) and return the fused-segment plan. Safe to race: the
    /// first finished build is published, later ones are discarded.
    pub fn prepare_segments(&self) -> Arc<SegmentPlan> {
        Arc::clone(self.plan.get_or_init(|| {
            let plan = segment::build(&self.code, &self.operator_hints, &self.tables);
            info!(
                "prepared {} fused segment(s) for {}()",
                plan.segments.len(),
                self.name
            );
            Arc::new(plan)
        }))
    }

    /// Interpreter-loop query: does a fused segment begin at `ip`?
    /// Returns nothing until [`ScriptFunction::prepare_segments`] has run.
    pub fn segment_at(&self, ip: usize) -> Option<&crate::vm::segment::FusedSegment> {
        self.plan.get()?.segment_at(ip)
    }

    pub fn constant(&self, idx: usize) -> Val {
        match self.consts.get(idx) {
            Some(v) => v.clone(),
            None => Val::Str(Arc::from("<errconst>")),
        }
    }

    pub fn global_name(&self, idx: usize) -> Arc<str> {
        match self.global_names.get(idx) {
            Some(name) => Arc::clone(name),
            None => Arc::from("<errgname>"),
        }
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("source_path", &self.source_path)
            .field("code_words", &self.code.len())
            .finish_non_exhaustive()
    }
}

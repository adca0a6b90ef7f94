use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Owners,
    Identities,
    Report,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Owners => "owners",
            Stage::Identities => "directory",
            Stage::Report => "report",
        }
    }
}

/// Observer for stage progress. Called from worker threads.
pub trait Progress: Sync {
    fn start(&self, _stage: Stage, _total: usize) {}
    fn advance(&self, _stage: Stage) {}
    fn finish(&self, _stage: Stage) {}
}

pub struct Silent;

impl Progress for Silent {}

/// Terminal progress bars on stderr; indicatif hides them when stderr is not a tty.
#[derive(Default)]
pub struct Bars {
    current: Mutex<Option<ProgressBar>>,
}

impl Bars {
    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.current.lock() {
            if let Some(bar) = guard.as_ref() {
                f(bar);
            }
        }
    }
}

impl Progress for Bars {
    fn start(&self, stage: Stage, total: usize) {
        let bar = ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::stderr());
        if let Ok(style) =
            ProgressStyle::with_template("{prefix:>9} [{bar:40}] {pos}/{len} [{elapsed}<{eta}]")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(stage.label());
        if let Ok(mut guard) = self.current.lock() {
            *guard = Some(bar);
        }
    }

    fn advance(&self, _stage: Stage) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn finish(&self, _stage: Stage) {
        if let Ok(mut guard) = self.current.lock() {
            if let Some(bar) = guard.take() {
                bar.finish_and_clear();
            }
        }
    }
}

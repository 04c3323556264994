//! Wrapper selection.

use std::path::Path;

use objcache_store::DataStore;

use super::{CompileContext, GccWrapper, Invocation, MsvcWrapper, ProgramWrapper};
use crate::config::Config;
use crate::exe_path::ExecutablePath;

/// Every supported family, in the order they are tried.
pub fn default_wrappers() -> Vec<Box<dyn ProgramWrapper>> {
    vec![Box::new(GccWrapper::new()), Box::new(MsvcWrapper::new())]
}

/// The wrapper chosen for an invocation, with its prepared context.
pub struct Selected<'a> {
    pub wrapper: &'a dyn ProgramWrapper,
    pub ctx: CompileContext,
}

impl std::fmt::Debug for Selected<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selected")
            .field("wrapper", &self.wrapper.name())
            .field("ctx", &self.ctx)
            .finish()
    }
}

/// Pick the first wrapper that recognizes `exe` and accepts the shape of
/// the invocation.
///
/// A wrapper that recognizes the executable but rejects the arguments does
/// not stop the search; `None` means the command should run uncached.
pub fn select_wrapper<'a>(
    wrappers: &'a [Box<dyn ProgramWrapper>],
    exe: &ExecutablePath,
    invocation: &Invocation,
    config: &Config,
    memo: Option<&DataStore>,
    scratch_dir: &Path,
) -> Option<Selected<'a>> {
    for wrapper in wrappers {
        if !wrapper.can_handle_command(exe, memo) {
            continue;
        }
        let ctx = CompileContext {
            exe: exe.clone(),
            args: wrapper.resolve_args(invocation),
            env: invocation.env.clone(),
            cwd: invocation.cwd.clone(),
            active: wrapper.capabilities().negotiate(config),
            accuracy: config.accuracy,
            scratch_dir: scratch_dir.to_path_buf(),
        };
        match wrapper.check_invocation_shape(&ctx) {
            Ok(()) => {
                tracing::debug!(wrapper = wrapper.name(), exe = %exe.real.display(), "selected wrapper");
                return Some(Selected {
                    wrapper: wrapper.as_ref(),
                    ctx,
                });
            }
            Err(err) => {
                tracing::debug!(wrapper = wrapper.name(), error = %err, "wrapper declined invocation");
            }
        }
    }
    None
}

use crate::{
    IoContext,
    Result,
    SyscallLib,
    Syscalls,
};

pub struct IoContextBuilder {
    max_events: usize,
    user_ring: bool,
}

impl Default for IoContextBuilder {
    fn default() -> Self {
        IoContextBuilder {
            max_events: 128,
            user_ring: true,
        }
    }
}

impl IoContextBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Depth of the context: how many requests may be in flight at once.
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Reap completions straight from the ring the kernel maps into the process (the default).
    /// When disabled every reap goes through `io_getevents`.
    pub fn with_user_ring(mut self, option: bool) -> Self {
        self.user_ring = option;
        self
    }

    pub fn build(self) -> Result<IoContext<Syscalls>> {
        self.build_with::<Syscalls>()
    }

    /// Build against an alternative syscall implementation.
    pub fn build_with<S: SyscallLib>(self) -> Result<IoContext<S>> {
        IoContext::setup_with(self.max_events, self.user_ring)
    }
}

#[cfg(test)]
mod test {
    use crate::context::test::MockSyscallLib;
    use crate::AioError;
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let ctx = IoContextBuilder::new().build_with::<MockSyscallLib>().unwrap();
        assert_eq!(128, ctx.max_events());
    }

    #[test]
    fn test_builder_depth() {
        let ctx = IoContextBuilder::new()
            .with_max_events(16)
            .with_user_ring(false)
            .build_with::<MockSyscallLib>()
            .unwrap();
        assert_eq!(16, ctx.max_events());

        assert!(matches!(
            IoContextBuilder::new().with_max_events(0).build_with::<MockSyscallLib>(),
            Err(AioError::InvalidArgument(_))
        ));
    }
}

pub(crate) mod allocator;
pub(crate) mod core;
pub(crate) mod registry;

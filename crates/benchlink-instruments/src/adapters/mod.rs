/*!
 * In-tree interface adapters.
 *
 * Transport-specific adapters (VISA, serial, ...) live in external
 * crates and implement [`crate::adapter::InterfaceAdapter`]; this
 * module carries the transport-free simulated adapter used by tests
 * and demos.
 */

mod sim;

pub use sim::SimAdapter;

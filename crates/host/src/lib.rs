// omt-host library
// Loopback control plane for the omniterm desktop app: filesystem RPC plus
// a WebSocket terminal bridge, gated by loopback/origin/token checks.

// Access gate (loopback, origin allow-list, constant-time token)
pub mod access;

// HTTP router and shared state
pub mod api;

// Configuration from environment
pub mod config;

// Filesystem RPC handlers
pub mod fs_handlers;

// Terminal PTY session (portable-pty)
pub mod terminal;

// Terminal WebSocket bridge
pub mod ws;

// Filesystem service
pub use omt_fs as fs;

mod migration;
mod session_open;
mod tombstone_reuse;

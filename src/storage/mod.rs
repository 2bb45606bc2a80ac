pub mod base;
pub mod block;
pub mod check;
pub mod cursor;
pub mod file_lock;
pub mod freelist;
pub mod io;
pub mod layout;
pub mod table;

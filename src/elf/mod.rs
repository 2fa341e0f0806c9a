//! ELF inspection and in-place patching of program headers

mod editor;
mod reader;
mod types;

pub use editor::entry_window;
pub use editor::null_interp;
pub use editor::read_window;
pub use editor::restore_interp;
pub use editor::write_window;
pub use editor::EntryWindow;
pub use reader::check_elf_magic;
pub use reader::has_elf_magic;
pub use reader::is_elf_file;
pub use reader::parse_elf;
pub use reader::read_elf;
pub use types::*;

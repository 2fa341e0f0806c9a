//! Types for ELF file information

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

pub const EM_386: u16 = 3;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const ELFOSABI_SYSV: u8 = 0;

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_INTERP: u32 = 3;

/// ELF class (word size) of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Elf32,
    Elf64,
}

/// A single program header, as read from the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Position in the program header table
    pub index: usize,
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
}

impl Segment {
    /// Whether `vaddr` falls inside the file-backed part of this segment
    pub fn contains_file_vaddr(&self, vaddr: u64) -> bool {
        vaddr >= self.vaddr && vaddr - self.vaddr < self.filesz
    }
}

/// Facts extracted from an ELF image
#[derive(Debug, Clone)]
pub struct ElfInfo {
    pub class: ElfClass,
    pub little_endian: bool,
    /// e_type
    pub elf_type: u16,
    /// e_machine
    pub machine: u16,
    /// EI_OSABI
    pub osabi: u8,
    /// e_entry
    pub entry: u64,
    /// e_phoff
    pub phoff: u64,
    /// e_phentsize
    pub phentsize: u16,
    pub segments: Vec<Segment>,
    /// DT_NEEDED entries, in table order
    pub needed: Vec<String>,
    /// DT_RPATH and DT_RUNPATH entries split on ':', `$ORIGIN` unexpanded
    pub rpath: Vec<String>,
    /// PT_INTERP string
    pub interpreter: Option<String>,
}

impl ElfInfo {
    /// Executable or shared object carrying a PT_INTERP segment
    pub fn is_dynamic_executable(&self) -> bool {
        (self.elf_type == ET_EXEC || self.elf_type == ET_DYN)
            && self.segments.iter().any(|s| s.p_type == PT_INTERP)
    }

    pub fn is_64bit(&self) -> bool {
        self.class == ElfClass::Elf64
    }

    /// The PT_LOAD segment whose file image contains the entry point
    pub fn entry_segment(&self) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.p_type == PT_LOAD && s.contains_file_vaddr(self.entry))
    }

    /// First PT_INTERP program header
    pub fn interp_segment(&self) -> Option<&Segment> {
        self.segments.iter().find(|s| s.p_type == PT_INTERP)
    }
}

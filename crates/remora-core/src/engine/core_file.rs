//! # ELF Core Dump Engine
//!
//! Serves target memory out of the `PT_LOAD` segments of an ELF core file.
//! Bytes past a segment's file size but inside its memory size read as zero,
//! the same way the kernel would have materialised them.
//!
//! Only the headers are parsed up front. Segment contents stay on disk and
//! are read one page at a time as the cache asks for them.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use object::{Object, ObjectKind, ObjectSegment, ReadCache};
use tracing::{debug, info};

use super::DebugEngine;
use crate::error::{RemoraError, Result};
use crate::types::{Architecture, Endianness, MachineDescriptor, ProcessId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CoreSegment
{
    start: u64,
    mem_size: u64,
    file_offset: u64,
    file_size: u64,
}

impl CoreSegment
{
    fn contains(&self, address: u64) -> bool
    {
        address >= self.start && address - self.start < self.mem_size
    }
}

/// Engine backed by an ELF core file
///
/// The machine descriptor passed at construction is replaced by the one the
/// core file declares once a dump is opened.
pub struct CoreFileEngine
{
    machine: MachineDescriptor,
    page_size: usize,
    segments: Vec<CoreSegment>,
    image: Option<File>,
}

impl CoreFileEngine
{
    pub fn new(machine: MachineDescriptor, page_size: usize) -> Self
    {
        Self {
            machine,
            page_size,
            segments: Vec::new(),
            image: None,
        }
    }

    fn load(&mut self, dump: &Path) -> Result<()>
    {
        let image = File::open(dump)?;
        let image_len = image.metadata()?.len();

        let (cpu, endianness, mut segments) = {
            let cache = ReadCache::new(&image);
            let file = object::File::parse(&cache)
                .map_err(|err| RemoraError::AttachFailed(format!("failed to parse {}: {err}", dump.display())))?;

            if file.kind() != ObjectKind::Core {
                return Err(RemoraError::AttachFailed(format!("{} is not a core file", dump.display())));
            }

            let cpu = match file.architecture() {
                object::Architecture::I386 => Architecture::X86,
                object::Architecture::X86_64 => Architecture::X86_64,
                object::Architecture::Aarch64 => Architecture::Aarch64,
                object::Architecture::Arm => Architecture::Arm,
                object::Architecture::Riscv64 => Architecture::Riscv64,
                other => {
                    return Err(RemoraError::AttachFailed(format!("unsupported core architecture {other:?}")));
                }
            };
            let endianness = if file.is_little_endian() {
                Endianness::Little
            } else {
                Endianness::Big
            };

            let mut segments = Vec::new();
            for segment in file.segments() {
                if segment.size() == 0 {
                    continue;
                }
                let (file_offset, file_size) = segment.file_range();
                if !file_offset.checked_add(file_size).is_some_and(|end| end <= image_len) {
                    return Err(RemoraError::AttachFailed(format!(
                        "segment at {:#x} runs past the end of {}",
                        segment.address(),
                        dump.display()
                    )));
                }
                segments.push(CoreSegment {
                    start: segment.address(),
                    mem_size: segment.size(),
                    file_offset,
                    file_size: file_size.min(segment.size()),
                });
            }
            (cpu, endianness, segments)
        };
        segments.sort_by_key(|segment| segment.start);

        info!(dump = %dump.display(), segments = segments.len(), cpu = %cpu, "opened core file");
        self.machine = MachineDescriptor::for_arch(self.machine.os(), cpu).with_endianness(endianness);
        self.segments = segments;
        self.image = Some(image);
        Ok(())
    }
}

impl DebugEngine for CoreFileEngine
{
    fn machine(&self) -> MachineDescriptor
    {
        self.machine
    }

    fn page_size(&self) -> usize
    {
        self.page_size
    }

    fn attach_process(&mut self, pid: ProcessId) -> Result<()>
    {
        Err(RemoraError::AttachFailed(format!(
            "core file engine cannot attach to live process {}",
            pid.0
        )))
    }

    fn attach_dump(&mut self, executable: &Path, dump: &Path) -> Result<()>
    {
        if !executable.exists() {
            return Err(RemoraError::AttachFailed(format!(
                "executable {} does not exist",
                executable.display()
            )));
        }
        self.load(dump)
    }

    fn detach(&mut self) -> Result<()>
    {
        if self.image.take().is_none() {
            return Err(RemoraError::DetachFailed("no dump open".into()));
        }
        debug!(segments = self.segments.len(), "released core file");
        self.segments.clear();
        Ok(())
    }

    fn read_bytes(&mut self, address: u64, len: usize) -> Result<Option<Vec<u8>>>
    {
        let image = self.image.as_mut().ok_or(RemoraError::NotAttached)?;
        let Some(end) = address.checked_add(len as u64) else {
            return Ok(None);
        };

        let mut output = Vec::with_capacity(len);
        let mut cursor = address;
        while cursor < end {
            let Some(segment) = self.segments.iter().find(|segment| segment.contains(cursor)) else {
                return Ok(None);
            };
            let chunk_end = end.min(segment.start.saturating_add(segment.mem_size));
            let from = cursor - segment.start;
            let to = chunk_end - segment.start;

            let backed = to.min(segment.file_size);
            if from < backed {
                let at = output.len();
                output.resize(at + (backed - from) as usize, 0);
                image.seek(SeekFrom::Start(segment.file_offset + from))?;
                image.read_exact(&mut output[at..])?;
            }
            output.resize(output.len() + (to - from.max(backed)) as usize, 0);
            cursor = chunk_end;
        }

        Ok(Some(output))
    }

    fn thread_id_from_system_id(&mut self, system_id: u64) -> Result<ThreadId>
    {
        // Core files name threads by their kernel tid; there is no separate
        // engine-side identifier to translate to.
        Ok(ThreadId(system_id))
    }
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use object::elf;

    use super::*;
    use crate::types::OsFamily;

    /// Minimal ELF64 core: header, one program header per load, then the
    /// file-backed bytes of each load in order
    fn elf_core(machine: u16, big_endian: bool, loads: &[(u64, u64, &[u8])]) -> Vec<u8>
    {
        let mut out = Vec::new();
        let put16 = |out: &mut Vec<u8>, v: u16| {
            out.extend_from_slice(&if big_endian { v.to_be_bytes() } else { v.to_le_bytes() })
        };
        let put32 = |out: &mut Vec<u8>, v: u32| {
            out.extend_from_slice(&if big_endian { v.to_be_bytes() } else { v.to_le_bytes() })
        };
        let put64 = |out: &mut Vec<u8>, v: u64| {
            out.extend_from_slice(&if big_endian { v.to_be_bytes() } else { v.to_le_bytes() })
        };

        let data = if big_endian { elf::ELFDATA2MSB } else { elf::ELFDATA2LSB };
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', elf::ELFCLASS64, data, elf::EV_CURRENT, 0]);
        out.extend_from_slice(&[0; 8]);
        put16(&mut out, elf::ET_CORE);
        put16(&mut out, machine);
        put32(&mut out, u32::from(elf::EV_CURRENT));
        put64(&mut out, 0); // e_entry
        put64(&mut out, 64); // e_phoff
        put64(&mut out, 0); // e_shoff
        put32(&mut out, 0); // e_flags
        put16(&mut out, 64); // e_ehsize
        put16(&mut out, 56); // e_phentsize
        put16(&mut out, loads.len() as u16);
        put16(&mut out, 64); // e_shentsize
        put16(&mut out, 0); // e_shnum
        put16(&mut out, 0); // e_shstrndx

        let mut offset = 64 + 56 * loads.len() as u64;
        for (vaddr, mem_size, bytes) in loads {
            put32(&mut out, elf::PT_LOAD);
            put32(&mut out, elf::PF_R);
            put64(&mut out, offset);
            put64(&mut out, *vaddr);
            put64(&mut out, 0); // p_paddr
            put64(&mut out, bytes.len() as u64);
            put64(&mut out, *mem_size);
            put64(&mut out, 0x1000);
            offset += bytes.len() as u64;
        }
        for (_, _, bytes) in loads {
            out.extend_from_slice(bytes);
        }
        out
    }

    fn open_core(image: &[u8]) -> (tempfile::TempDir, Result<CoreFileEngine>)
    {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("a.out");
        let core = dir.path().join("core");
        fs::write(&exe, b"").unwrap();
        fs::write(&core, image).unwrap();

        let mut engine = CoreFileEngine::new(MachineDescriptor::for_arch(OsFamily::Linux, Architecture::X86), 0x1000);
        let opened = engine.attach_dump(&exe, &core).map(|()| engine);
        (dir, opened)
    }

    #[test]
    fn opens_real_core_and_adopts_its_machine()
    {
        let text = vec![0xaa; 0x1800];
        let (_dir, engine) = open_core(&elf_core(elf::EM_X86_64, false, &[(0x1000, 0x2000, &text[..])]));
        let engine = engine.unwrap();

        assert_eq!(engine.machine().cpu(), Architecture::X86_64);
        assert_eq!(engine.machine().endianness(), Endianness::Little);
        assert_eq!(engine.machine().os(), OsFamily::Linux);
        assert_eq!(
            engine.segments,
            vec![CoreSegment {
                start: 0x1000,
                mem_size: 0x2000,
                file_offset: 64 + 56,
                file_size: 0x1800,
            }]
        );
    }

    #[test]
    fn big_endian_core_reports_big_endian()
    {
        let (_dir, engine) = open_core(&elf_core(elf::EM_AARCH64, true, &[(0x4000, 0x1000, &[0u8; 0x1000][..])]));
        let engine = engine.unwrap();

        assert_eq!(engine.machine().cpu(), Architecture::Aarch64);
        assert_eq!(engine.machine().endianness(), Endianness::Big);
    }

    #[test]
    fn reads_zero_fill_past_file_size()
    {
        let text = vec![0xaa; 0x1800];
        let (_dir, engine) = open_core(&elf_core(elf::EM_X86_64, false, &[(0x1000, 0x2000, &text[..])]));
        let mut engine = engine.unwrap();

        let page = engine.read_bytes(0x2000, 0x1000).unwrap().unwrap();
        assert!(page[..0x800].iter().all(|b| *b == 0xaa));
        assert!(page[0x800..].iter().all(|b| *b == 0));
    }

    #[test]
    fn reads_across_adjacent_segments()
    {
        let first = vec![1; 0x1000];
        let second = vec![2; 0x1000];
        // Listed out of address order on purpose.
        let image = elf_core(elf::EM_X86_64, false, &[(0x2000, 0x1000, &second[..]), (0x1000, 0x1000, &first[..])]);
        let (_dir, engine) = open_core(&image);
        let mut engine = engine.unwrap();

        let bytes = engine.read_bytes(0x1ffe, 4).unwrap().unwrap();
        assert_eq!(bytes, vec![1, 1, 2, 2]);
    }

    #[test]
    fn gaps_are_unmapped()
    {
        let (_dir, engine) = open_core(&elf_core(elf::EM_X86_64, false, &[(0x1000, 0x1000, &[0u8; 0x1000][..])]));
        let mut engine = engine.unwrap();

        assert_eq!(engine.read_bytes(0x3000, 0x1000).unwrap(), None);
        assert_eq!(engine.read_bytes(0x1800, 0x1000).unwrap(), None);
        assert_eq!(engine.read_bytes(u64::MAX - 0xfff, 0x1000).unwrap(), None);
    }

    #[test]
    fn truncated_core_is_rejected()
    {
        let mut image = elf_core(elf::EM_X86_64, false, &[(0x1000, 0x1000, &[7u8; 0x1000][..])]);
        image.truncate(image.len() - 0x800);
        let (_dir, engine) = open_core(&image);
        assert!(matches!(engine, Err(RemoraError::AttachFailed(_))));
    }

    #[test]
    fn unsupported_architecture_is_rejected()
    {
        let (_dir, engine) = open_core(&elf_core(elf::EM_MIPS, false, &[(0x1000, 0x1000, &[0u8; 0x1000][..])]));
        assert!(matches!(engine, Err(RemoraError::AttachFailed(msg)) if msg.contains("architecture")));
    }

    #[test]
    fn detach_releases_the_image()
    {
        let (_dir, engine) = open_core(&elf_core(elf::EM_X86_64, false, &[(0x1000, 0x1000, &[0u8; 0x1000][..])]));
        let mut engine = engine.unwrap();

        engine.detach().unwrap();
        assert!(matches!(engine.read_bytes(0x1000, 8), Err(RemoraError::NotAttached)));
        assert!(matches!(engine.detach(), Err(RemoraError::DetachFailed(_))));
    }

    #[test]
    fn rejects_live_attach_and_non_core_files()
    {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-a-core");
        fs::write(&bogus, b"definitely not ELF").unwrap();

        let mut engine = CoreFileEngine::new(
            MachineDescriptor::for_arch(OsFamily::Linux, Architecture::X86_64),
            0x1000,
        );
        assert!(matches!(engine.attach_process(ProcessId(1)), Err(RemoraError::AttachFailed(_))));
        assert!(matches!(engine.attach_dump(&bogus, &bogus), Err(RemoraError::AttachFailed(_))));
        assert!(matches!(engine.read_bytes(0x1000, 8), Err(RemoraError::NotAttached)));
    }
}

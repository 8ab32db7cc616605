//! End-to-end tests against this test process through `/proc`
//!
//! Each test attaches a session to its own process. Hosts that forbid that
//! (no `/proc`, restrictive ptrace policy) skip the test.

#![cfg(target_os = "linux")]

use remora_core::engine::procfs::ProcfsEngine;
use remora_core::error::RemoraError;
use remora_core::types::{Address, ProcessId};
use remora_core::{DebugSession, SessionConfig};

#[no_mangle]
#[inline(never)]
pub extern "C" fn remora_self_attach_marker() -> u64
{
    std::hint::black_box(0x5eed)
}

#[no_mangle]
pub static REMORA_SELF_ATTACH_VALUE: u64 = 0x0123_4567_89ab_cdef;

/// Session attached to this process, or `None` where the host forbids it
fn self_session() -> Option<DebugSession>
{
    let engine = ProcfsEngine::new().ok()?;
    let session = DebugSession::new(engine, SessionConfig::default().with_native_lookup(false)).unwrap();

    match session.attach_to_process(ProcessId(std::process::id())) {
        Ok(()) => Some(session),
        Err(RemoraError::AttachFailed(msg)) if msg.contains("permission denied") => None,
        Err(err) => panic!("self-attach failed: {err}"),
    }
}

fn test_binary_name() -> String
{
    let exe = std::env::current_exe().unwrap();
    exe.file_name().unwrap().to_string_lossy().into_owned()
}

#[test]
fn test_own_executable_is_discovered_on_attach()
{
    let Some(session) = self_session() else { return };
    let exe = std::env::current_exe().unwrap();

    let objects = session.load_objects().unwrap();
    let own = objects.iter().find(|info| info.short_name == test_binary_name()).unwrap();
    assert_eq!(own.path, exe);
    assert!(own.size > 0);
}

#[test]
fn test_symbol_address_matches_the_real_function()
{
    let Some(session) = self_session() else { return };
    let expected = Address::new(remora_self_attach_marker as usize as u64).unwrap();

    let found = session
        .lookup_symbol_address(&test_binary_name(), "remora_self_attach_marker")
        .unwrap();
    assert_eq!(found, Some(expected));
}

#[test]
fn test_closest_symbol_inside_the_marker_function()
{
    let Some(session) = self_session() else { return };
    let inside = Address::new(remora_self_attach_marker as usize as u64 + 1).unwrap();

    let closest = session.closest_symbol_to_address(inside).unwrap().unwrap();
    assert_eq!(closest.name.raw(), "remora_self_attach_marker");
    assert_eq!(closest.offset, 1);
    assert_eq!(closest.to_string(), "remora_self_attach_marker+0x1");
}

#[test]
fn test_data_symbol_resolves_and_reads_back()
{
    let Some(session) = self_session() else { return };

    let address = session
        .lookup_symbol_address(&test_binary_name(), "REMORA_SELF_ATTACH_VALUE")
        .unwrap()
        .unwrap();
    assert_eq!(address.value(), std::ptr::addr_of!(REMORA_SELF_ATTACH_VALUE) as u64);
    assert_eq!(session.read_u64(address.value()).unwrap(), REMORA_SELF_ATTACH_VALUE);
}

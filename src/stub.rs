//! Run-time abort stub generator (step 6, relocation engine resolver
//! pipeline), built only when the `runtime-stub` feature and the
//! *linker-die-at-runtime* environment toggle are both active.
//!
//! A stub is a tiny, position-independent machine-code trampoline that loads
//! the address of a per-symbol data block into the target architecture's
//! first-argument register (or, on i386, pushes it per `cdecl`) and tail-calls
//! a single shared dispatcher. This replaces the upstream loader's approach
//! of copying a reference stub implementation plus a sidecar pointer: the
//! trampoline is generated directly, so there is no reference implementation
//! to keep in sync with this crate's own data layout.
use crate::error::Result;
use crate::mmap::{LibcMmap, MapFlags, Mmap, ProtFlags};

#[repr(C)]
struct StubData {
 name: Box<str>,
}

/// Prints the missing symbol's name, bracketed as `>name<` like the
/// original linker's own diagnostic, and exits with status 1. Leaked
/// [`StubData`] blocks are never freed — one per distinct missing symbol,
/// bounded by the guest's own symbol table size.
extern "C" fn dispatch(data: *const StubData) -> ! {
 let name = unsafe { &(*data).name };
 eprintln!("bionic_loader: CANNOT LINK EXECUTABLE: cannot locate symbol (symbol name: >{name}<)");
 std::process::exit(1);
}

#[cfg(target_arch = "x86_64")]
fn emit(data_ptr: u64, dispatch_ptr: u64) -> Vec<u8> {
 let mut code = Vec::with_capacity(20);
 code.extend_from_slice(&[0x48, 0xBF]); // movabs rdi, imm64
 code.extend_from_slice(&data_ptr.to_le_bytes());
 code.extend_from_slice(&[0x48, 0xB8]); // movabs rax, imm64
 code.extend_from_slice(&dispatch_ptr.to_le_bytes());
 code.extend_from_slice(&[0xFF, 0xE0]); // jmp rax
 code
}

#[cfg(target_arch = "aarch64")]
fn emit(data_ptr: u64, dispatch_ptr: u64) -> Vec<u8> {
 let mut code = Vec::with_capacity(32);
 code.extend_from_slice(&0x5800_0080u32.to_le_bytes()); // ldr x0, [pc, #16]
 code.extend_from_slice(&0x5800_00A1u32.to_le_bytes()); // ldr x1, [pc, #20]
 code.extend_from_slice(&0xD61F_0020u32.to_le_bytes()); // br x1
 code.extend_from_slice(&0xD503_201Fu32.to_le_bytes()); // nop (pad to 8-byte literal alignment)
 code.extend_from_slice(&data_ptr.to_le_bytes());
 code.extend_from_slice(&dispatch_ptr.to_le_bytes());
 code
}

#[cfg(target_arch = "arm")]
fn emit(data_ptr: u32, dispatch_ptr: u32) -> Vec<u8> {
 let mut code = Vec::with_capacity(24);
 code.extend_from_slice(&0xE59F_0008u32.to_le_bytes()); // ldr r0, [pc, #8]
 code.extend_from_slice(&0xE59F_1008u32.to_le_bytes()); // ldr r1, [pc, #8]
 code.extend_from_slice(&0xE12F_FF11u32.to_le_bytes()); // bx r1
 code.extend_from_slice(&data_ptr.to_le_bytes());
 code.extend_from_slice(&dispatch_ptr.to_le_bytes());
 code
}

#[cfg(target_arch = "x86")]
fn emit(data_ptr: u32, dispatch_ptr: u32) -> Vec<u8> {
 let mut code = Vec::with_capacity(12);
 code.push(0x68); // push imm32 (cdecl arg0, stacks beneath the call's own return address)
 code.extend_from_slice(&data_ptr.to_le_bytes());
 code.push(0xB8); // mov eax, imm32
 code.extend_from_slice(&dispatch_ptr.to_le_bytes());
 code.extend_from_slice(&[0xFF, 0xD0]); // call eax
 code
}

/// Builds and installs a stub for `name`, returning its callable address.
/// The caller (the relocation engine) writes this address into the target
/// just as it would a normally resolved symbol.
pub(crate) fn install(name: &str) -> Result<usize> {
 let data = Box::leak(Box::new(StubData { name: name.into() })) as *mut StubData;

 #[cfg(target_pointer_width = "64")]
 let code = emit(data as u64, dispatch as usize as u64);
 #[cfg(target_pointer_width = "32")]
 let code = emit(data as u32, dispatch as usize as u32);

 let len = (code.len() + 0xFFF) & !0xFFF;
 let reservation = unsafe {
 LibcMmap::mmap_anonymous(
 0,
 len,
 ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
 MapFlags::MAP_PRIVATE)?
 };
 unsafe {
 std::ptr::copy_nonoverlapping(code.as_ptr(), reservation.as_ptr().cast(), code.len());
 }
 let exec_prot = ProtFlags::PROT_READ | ProtFlags::PROT_EXEC;
 unsafe { LibcMmap::mprotect(reservation, len, exec_prot)? };

 Ok(reservation.as_ptr() as usize)
}

#[cfg(test)]
mod tests {
 use super::*;

 #[cfg(target_arch = "x86_64")]
 #[test]
 fn x86_64_trampoline_shape() {
 let code = emit(0x1122_3344_5566_7788, 0x8877_6655_4433_2211);
 assert_eq!(code.len(), 20);
 assert_eq!(&code[0..2], &[0x48, 0xBF]);
 assert_eq!(&code[10..12], &[0x48, 0xB8]);
 assert_eq!(&code[18..20], &[0xFF, 0xE0]);
 }

 #[cfg(target_arch = "aarch64")]
 #[test]
 fn aarch64_trampoline_shape() {
 let code = emit(0x1122_3344_5566_7788, 0x8877_6655_4433_2211);
 assert_eq!(code.len(), 32);
 assert_eq!(&code[16..24], &0x1122_3344_5566_7788u64.to_le_bytes());
 assert_eq!(&code[24..32], &0x8877_6655_4433_2211u64.to_le_bytes());
 }
}

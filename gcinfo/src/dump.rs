use std::fs;
use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::debug;

use gcinfo_format::{GC_INFO_VERSION, GcInfoEncoding, GcInfoToken, GcSlotFlags};
use gcinfo_runtime::cpu::{Arm, Arm64, Interpreter, LoongArch64, RiscV64, Target, X64};
use gcinfo_runtime::stack::MAX_REGISTERS;
use gcinfo_runtime::{
    Address, CodeManagerFlags, DecodeFlags, GcCallFlags, GcInfoDecoder, RegDisplay, RootReporter,
    SlotLocation,
};

use crate::flags::{DumpArgs, TargetArch};

// Stack slots are printed, never dereferenced.
const STACK_POINTER: usize = 0x10000;
const CALLER_STACK_POINTER: usize = 0x20000;

pub fn command_dump(args: &DumpArgs, out: &mut dyn Write) -> Result<()> {
    let data =
        fs::read(&args.file).with_context(|| format!("failed to read {}", args.file.display()))?;
    debug!(bytes = data.len(), file = %args.file.display(), "read blob");

    let bytes = if args.hex { parse_hex(&data)? } else { data };
    let token = GcInfoToken::try_new(&bytes, args.version)?;

    match args.target {
        TargetArch::X64 => dump::<X64>(token, args, out),
        TargetArch::Arm => dump::<Arm>(token, args, out),
        TargetArch::Arm64 => dump::<Arm64>(token, args, out),
        TargetArch::LoongArch64 => dump::<LoongArch64>(token, args, out),
        TargetArch::RiscV64 => dump::<RiscV64>(token, args, out),
        TargetArch::Interpreter => dump::<Interpreter>(token, args, out),
    }
}

/// Accepts hex digits separated by arbitrary whitespace.
pub fn parse_hex(text: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .iter()
        .copied()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }

    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair)?;
            u8::from_str_radix(pair, 16).with_context(|| format!("invalid hex byte '{}'", pair))
        })
        .collect()
}

fn dump<T: Target>(token: GcInfoToken<'_>, args: &DumpArgs, out: &mut dyn Write) -> Result<()> {
    let decoder = GcInfoDecoder::<T>::new(token, DecodeFlags::EVERYTHING, 0);
    dump_header(&decoder, out)?;

    let mut safe_points = Vec::new();
    decoder.enumerate_safe_points(|offset| safe_points.push(offset));

    writeln!(out, "safe points: {}", safe_points.len())?;
    for offset in &safe_points {
        writeln!(out, "  {:#x}", offset)?;
    }

    let mut ranges = Vec::new();
    decoder.enumerate_interruptible_ranges(|start, stop| {
        ranges.push((start, stop));
        false
    });

    writeln!(out, "interruptible ranges: {}", ranges.len())?;
    for (start, stop) in &ranges {
        writeln!(out, "  [{:#x}, {:#x})", start, stop)?;
    }

    let mut slots = decoder.slot_table();
    writeln!(
        out,
        "slots: {} registers, {} stack, {} untracked",
        slots.num_registers(),
        slots.num_stack_slots(),
        slots.num_untracked()
    )?;

    for index in 0..slots.num_slots() {
        let desc = slots.slot_desc(index);
        writeln!(out, "  {:3} {}{}", index, desc.slot, slot_flags(desc.flags))?;
    }

    let offsets = match args.offset {
        Some(offset) => vec![offset],
        None if args.all_offsets => {
            let step = T::Encoding::denormalize_code_offset(1).max(1) as usize;
            let mut offsets = safe_points.clone();

            for &(start, stop) in &ranges {
                offsets.extend((start..stop).step_by(step));
            }

            offsets.sort_unstable();
            offsets.dedup();
            offsets
        }
        None => safe_points,
    };

    writeln!(out, "live roots:")?;
    for offset in offsets {
        dump_roots::<T>(token, offset, args.aborted, out)?;
    }

    Ok(())
}

fn dump_header<T: Target>(decoder: &GcInfoDecoder<'_, T>, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "target: {}", T::NAME)?;
    writeln!(out, "version: {}", decoder.version())?;
    writeln!(out, "code length: {:#x}", decoder.code_length())?;

    if decoder.version() < GC_INFO_VERSION {
        writeln!(out, "return kind: {:?}", decoder.return_kind())?;
    }

    writeln!(out, "vararg: {}", decoder.is_vararg())?;
    writeln!(out, "tail calls: {}", decoder.has_tail_calls())?;
    writeln!(out, "report only leaf: {}", decoder.wants_report_only_leaf())?;

    if let Some(slot) = decoder.gs_cookie_stack_slot() {
        let (start, end) = decoder.gs_cookie_valid_range();
        writeln!(out, "gs cookie: {} valid in [{:#x}, {:#x})", slot, start, end)?;
    }

    if let Some(slot) = decoder.psp_sym_stack_slot() {
        writeln!(out, "psp sym: {}", slot)?;
    }

    if let Some(slot) = decoder.generics_inst_context_stack_slot() {
        writeln!(
            out,
            "generics context: {} ({:?}), prolog size {:#x}",
            slot,
            decoder.generics_inst_context_kind(),
            decoder.prolog_size()
        )?;
    }

    if let Some(reg) = decoder.stack_base_register() {
        writeln!(out, "stack base register: r{}", reg)?;
    }

    if let Some(size) = decoder.size_of_edit_and_continue_preserved_area() {
        writeln!(
            out,
            "edit and continue: preserved area {}, fixed frame {}",
            size,
            decoder.size_of_edit_and_continue_fixed_stack_frame()
        )?;
    }

    if let Some(slot) = decoder.reverse_pinvoke_frame_stack_slot() {
        writeln!(out, "reverse pinvoke frame: {}", slot)?;
    }

    writeln!(out, "stack parameter area: {}", decoder.size_of_stack_parameter_area())?;
    writeln!(out, "header and counts: {} bytes", decoder.num_bytes_read())?;

    Ok(())
}

fn dump_roots<T: Target>(
    token: GcInfoToken<'_>,
    offset: u32,
    aborted: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let mut everything = GcInfoDecoder::<T>::new(token, DecodeFlags::EVERYTHING, 0);

    // old formats look up lifetimes at a call site by the offset inside the call
    let query = if token.version < GC_INFO_VERSION && everything.is_safe_point_at(offset) {
        offset - 1
    } else {
        offset
    };

    let decoder = GcInfoDecoder::<T>::new(token, DecodeFlags::GC_LIFETIMES, query);

    if decoder.has_interruptible_ranges() && !decoder.is_safe_point() && !aborted {
        let interruptible =
            GcInfoDecoder::<T>::new(token, DecodeFlags::INTERRUPTIBILITY, offset).is_interruptible();

        if !interruptible {
            writeln!(out, "  {:#x}: not a safe point and not interruptible", offset)?;
            return Ok(());
        }
    }

    // every register gets a save location so nothing falls back to the context
    let saved = [0usize; MAX_REGISTERS];
    let mut rd = RegDisplay::new(
        Address::from(STACK_POINTER),
        Address::from(CALLER_STACK_POINTER),
    );

    for reg in 0..MAX_REGISTERS as u32 {
        let location = Address::from_ptr(&saved[reg as usize]);
        rd.current_context_pointers.set(reg, location);
        rd.volatile_context_pointers.set(reg, location);
    }

    let mut flags = CodeManagerFlags::ACTIVE_STACK_FRAME;

    if aborted {
        flags |= CodeManagerFlags::EXECUTION_ABORTED;
    }

    let mut roots = Vec::new();
    let mut reporter = RootReporter::promotion(|_slot, flags, location| {
        roots.push(describe_root(location, flags));
    });
    decoder.enumerate_live_slots(&rd, flags, &mut reporter);

    if roots.is_empty() {
        writeln!(out, "  {:#x}: none", offset)?;
    } else {
        writeln!(out, "  {:#x}: {}", offset, roots.join(", "))?;
    }

    Ok(())
}

fn describe_root(location: SlotLocation, flags: GcCallFlags) -> String {
    let mut result = location.to_string();

    if flags.contains(GcCallFlags::INTERIOR) {
        result.push_str(" interior");
    }

    if flags.contains(GcCallFlags::PINNED) {
        result.push_str(" pinned");
    }

    result
}

fn slot_flags(flags: GcSlotFlags) -> String {
    let mut result = String::new();

    for (flag, name) in [
        (GcSlotFlags::INTERIOR, "interior"),
        (GcSlotFlags::PINNED, "pinned"),
        (GcSlotFlags::UNTRACKED, "untracked"),
    ] {
        if flags.contains(flag) {
            result.push(' ');
            result.push_str(name);
        }
    }

    result
}

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gcinfo_format::{
    Amd64Encoding, Arm64Encoding, ArmEncoding, GC_INFO_VERSION, GcInfoEncoder, GcInfoEncoding,
    GcInfoToken, GcSlot, GcSlotDesc, GcSlotFlags, GcSlotState, GcStackSlotBase,
    InterpreterEncoding, SlotId,
};
use gcinfo_runtime::cpu::{arm, arm64, interp, x64};
use gcinfo_runtime::cpu::{Arm, Arm64, Interpreter, X64};
use gcinfo_runtime::{
    Address, CodeManagerFlags, DecodeFlags, GcCallFlags, GcInfoDecoder, RegDisplay, RootSet,
    Target,
};

const STACK_WORDS: usize = 96;
const CALLER_SP_OFFSET: usize = 512;
const FRAME_OFFSET: usize = 256;

type Root = (usize, u32);

/// Stack memory and register save area of a suspended frame.
struct Frame {
    stack: Vec<u64>,
    saved: Vec<usize>,
}

impl Frame {
    fn new() -> Frame {
        let mut frame = Frame {
            stack: vec![0; STACK_WORDS],
            saved: vec![0; 32],
        };
        let frame_pointer = frame.sp().offset(FRAME_OFFSET).to_usize();
        frame.saved[x64::RBP as usize] = frame_pointer;
        frame
    }

    fn sp(&self) -> Address {
        Address::from_ptr(self.stack.as_ptr())
    }

    fn saved_register(&self, reg: u32) -> Address {
        Address::from_ptr(&self.saved[reg as usize])
    }

    fn reg_display(&self) -> RegDisplay {
        let mut rd = RegDisplay::new(self.sp(), self.sp().offset(CALLER_SP_OFFSET));

        for reg in 0..=x64::R15 {
            if reg != x64::RSP {
                rd.current_context_pointers
                    .set(reg, self.saved_register(reg));
            }
        }

        rd
    }

    fn address_of(&self, desc: &GcSlotDesc) -> Address {
        match desc.slot {
            GcSlot::Register(reg) => self.saved_register(reg),
            GcSlot::Stack { offset, base } => {
                let start = match base {
                    GcStackSlotBase::SpRel => self.sp(),
                    GcStackSlotBase::CallerSpRel => self.sp().offset(CALLER_SP_OFFSET),
                    GcStackSlotBase::FrameRegRel => self.sp().offset(FRAME_OFFSET),
                };
                start.ioffset(offset as isize)
            }
        }
    }
}

fn call_flags(desc: &GcSlotDesc) -> GcCallFlags {
    let mut flags = GcCallFlags::CHECK_APP_DOMAIN;

    if desc.flags.contains(GcSlotFlags::INTERIOR) {
        flags |= GcCallFlags::INTERIOR;
    }

    if desc.flags.contains(GcSlotFlags::PINNED) {
        flags |= GcCallFlags::PINNED;
    }

    flags
}

/// Describes a method the way a code generator would hand it to the encoder.
#[derive(Default)]
struct Method {
    version: Option<u32>,
    code_length: u32,
    slots: Vec<GcSlotDesc>,
    lifetimes: Vec<Vec<(u32, bool)>>,
    call_sites: Vec<u32>,
    ranges: Vec<(u32, u32)>,
    stack_area: u32,
}

impl Method {
    fn new(code_length: u32) -> Method {
        Method {
            code_length,
            ..Method::default()
        }
    }

    fn add_slot(&mut self, desc: GcSlotDesc, lifetime: &[(u32, bool)]) -> usize {
        self.slots.push(desc);
        self.lifetimes.push(lifetime.to_vec());
        self.slots.len() - 1
    }

    fn random(rng: &mut StdRng, fully_interruptible: bool, max_slots: usize) -> Method {
        let mut method = Method::new(0);

        if fully_interruptible {
            let mut start = rng.random_range(0..20);

            for _ in 0..rng.random_range(1..=3) {
                let length = rng.random_range(20..150);
                method.ranges.push((start, length));
                start += length + rng.random_range(1..20);
            }

            method.code_length = start + rng.random_range(1..20);
        } else {
            method.code_length = rng.random_range(40..400);
        }

        let mut call_sites = HashSet::new();

        for _ in 0..rng.random_range(1..30) {
            call_sites.insert(rng.random_range(1..method.code_length));
        }

        method.call_sites = call_sites.into_iter().collect();
        method.call_sites.sort_unstable();

        let mut registers = HashSet::new();
        let num_registers = rng.random_range(0..=10.min(max_slots));

        while registers.len() < num_registers {
            let reg = rng.random_range(0..=x64::R15);

            if reg != x64::RSP {
                registers.insert(reg);
            }
        }

        let mut registers: Vec<u32> = registers.into_iter().collect();
        registers.sort_unstable();

        for reg in registers {
            let flags = random_flags(rng);
            let lifetime = random_lifetime(rng, method.code_length);
            method.add_slot(GcSlotDesc::register(reg, flags), &lifetime);
        }

        let mut stack_slots = HashSet::new();
        let num_stack_slots = rng.random_range(0..=max_slots - method.slots.len());

        while stack_slots.len() < num_stack_slots {
            let (base, offset) = match rng.random_range(0..3) {
                0 => (GcStackSlotBase::SpRel, rng.random_range(0..64) * 8),
                1 => (GcStackSlotBase::CallerSpRel, -rng.random_range(1..=64) * 8),
                _ => (GcStackSlotBase::FrameRegRel, rng.random_range(-32..32) * 8),
            };

            if !stack_slots.insert((base, offset)) {
                continue;
            }

            if rng.random_bool(0.15) {
                let mut flags = GcSlotFlags::UNTRACKED;
                if rng.random_bool(0.3) {
                    flags |= GcSlotFlags::INTERIOR;
                }
                method.add_slot(GcSlotDesc::stack(offset, base, flags), &[]);
            } else {
                let flags = random_flags(rng);
                let lifetime = random_lifetime(rng, method.code_length);
                method.add_slot(GcSlotDesc::stack(offset, base, flags), &lifetime);
            }
        }

        method
    }

    fn encode<E: GcInfoEncoding>(&self) -> Vec<u8> {
        let mut encoder = GcInfoEncoder::<E>::new();

        if let Some(version) = self.version {
            encoder.set_version(version);
        }

        encoder.set_code_length(self.code_length);
        encoder.set_size_of_stack_outgoing_and_scratch_area(self.stack_area);

        let uses_frame_register = self.slots.iter().any(|desc| {
            matches!(
                desc.slot,
                GcSlot::Stack {
                    base: GcStackSlotBase::FrameRegRel,
                    ..
                }
            )
        });

        if uses_frame_register {
            encoder.set_stack_base_register(x64::RBP);
        }

        let ids: Vec<SlotId> = self
            .slots
            .iter()
            .map(|desc| match desc.slot {
                GcSlot::Register(reg) => encoder.get_register_slot_id(reg, desc.flags),
                GcSlot::Stack { offset, base } => {
                    encoder.get_stack_slot_id(offset, desc.flags, base)
                }
            })
            .collect();

        for (id, lifetime) in ids.iter().zip(&self.lifetimes) {
            for &(offset, live) in lifetime {
                let state = if live {
                    GcSlotState::Live
                } else {
                    GcSlotState::Dead
                };
                encoder.set_slot_state(offset, *id, state);
            }
        }

        encoder.define_call_sites(&self.call_sites);

        for &(start, length) in &self.ranges {
            encoder.define_interruptible_range(start, length);
        }

        encoder.build().expect("encoding failed")
    }

    fn is_untracked(&self, index: usize) -> bool {
        self.slots[index].flags.contains(GcSlotFlags::UNTRACKED)
    }

    fn is_live(&self, index: usize, offset: u32) -> bool {
        self.lifetimes[index]
            .iter()
            .take_while(|&&(transition, _)| transition <= offset)
            .last()
            .is_some_and(|&(_, live)| live)
    }

    fn expected_roots(&self, frame: &Frame, offset: u32, untracked: bool) -> Vec<Root> {
        let mut roots: Vec<Root> = (0..self.slots.len())
            .filter(|&index| {
                if self.is_untracked(index) {
                    untracked
                } else {
                    self.is_live(index, offset)
                }
            })
            .map(|index| {
                let desc = &self.slots[index];
                (frame.address_of(desc).to_usize(), call_flags(desc).bits())
            })
            .collect();

        roots.sort_unstable();
        roots
    }

    fn in_range(&self, offset: u32) -> bool {
        self.ranges
            .iter()
            .any(|&(start, length)| start <= offset && offset < start + length)
    }

    fn query_offsets(&self) -> Vec<u32> {
        let mut offsets: Vec<u32> = self.call_sites.clone();

        for &(start, length) in &self.ranges {
            offsets.extend(start..start + length);
        }

        offsets.sort_unstable();
        offsets.dedup();
        offsets
    }
}

fn random_flags(rng: &mut StdRng) -> GcSlotFlags {
    let mut flags = GcSlotFlags::BASE;

    if rng.random_bool(0.2) {
        flags |= GcSlotFlags::INTERIOR;
    }

    if rng.random_bool(0.1) {
        flags |= GcSlotFlags::PINNED;
    }

    flags
}

/// Alternating transitions at distinct offsets, starting with live.
fn random_lifetime(rng: &mut StdRng, code_length: u32) -> Vec<(u32, bool)> {
    let mut offsets = HashSet::new();

    for _ in 0..rng.random_range(0..6) {
        offsets.insert(rng.random_range(0..code_length));
    }

    let mut offsets: Vec<u32> = offsets.into_iter().collect();
    offsets.sort_unstable();

    offsets
        .into_iter()
        .enumerate()
        .map(|(idx, offset)| (offset, idx % 2 == 0))
        .collect()
}

fn live_roots<T: Target>(
    bytes: &[u8],
    version: Option<u32>,
    offset: u32,
    rd: &RegDisplay,
    flags: CodeManagerFlags,
) -> Vec<Root> {
    let token = match version {
        Some(version) => GcInfoToken::try_new(bytes, version).expect("supported version"),
        None => GcInfoToken::new(bytes),
    };

    let decoder = GcInfoDecoder::<T>::new(token, DecodeFlags::GC_LIFETIMES, offset);
    let mut roots = RootSet::promotion();
    decoder.enumerate_live_slots(rd, flags, &mut roots);

    sorted(&roots)
}

fn sorted(roots: &RootSet) -> Vec<Root> {
    let mut result: Vec<Root> = roots
        .roots
        .iter()
        .map(|&(slot, flags, _)| (slot.address().to_usize(), flags.bits()))
        .collect();
    result.sort_unstable();
    result
}

fn check_all_offsets(method: &Method, bytes: &[u8]) {
    let frame = Frame::new();
    let rd = frame.reg_display();
    let old_format = method
        .version
        .is_some_and(|version| version < GC_INFO_VERSION);

    for offset in method.query_offsets() {
        let is_call_site = method.call_sites.contains(&offset);

        // old formats record a call site by the offset inside the call, so
        // that offset is never interrupted on its own
        if old_format && !is_call_site && method.call_sites.contains(&(offset + 1)) {
            continue;
        }

        let query = if old_format && is_call_site {
            offset - 1
        } else {
            offset
        };

        assert_eq!(
            method.expected_roots(&frame, offset, true),
            live_roots::<X64>(
                bytes,
                method.version,
                query,
                &rd,
                CodeManagerFlags::ACTIVE_STACK_FRAME
            ),
            "offset {}",
            offset
        );
    }
}

#[test]
fn randomized_partially_interruptible() {
    for seed in 0..25 {
        let mut rng = StdRng::seed_from_u64(seed);
        let method = Method::random(&mut rng, false, 24);
        let bytes = method.encode::<Amd64Encoding>();

        check_all_offsets(&method, &bytes);
    }
}

#[test]
fn randomized_fully_interruptible() {
    for seed in 100..125 {
        let mut rng = StdRng::seed_from_u64(seed);
        let method = Method::random(&mut rng, true, 24);
        let bytes = method.encode::<Amd64Encoding>();

        check_all_offsets(&method, &bytes);
    }
}

#[test]
fn randomized_old_format() {
    for seed in 200..210 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut method = Method::random(&mut rng, seed % 2 == 0, 16);
        method.version = Some(3);
        let bytes = method.encode::<Amd64Encoding>();

        check_all_offsets(&method, &bytes);
    }
}

#[test]
fn slots_beyond_the_predecoded_prefix() {
    for (seed, fully_interruptible) in [(300, false), (301, true)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut method = Method::random(&mut rng, fully_interruptible, 100);

        while method.slots.len() <= 70 {
            let offset = -8 * (method.slots.len() as i32 + 100);
            let lifetime = random_lifetime(&mut rng, method.code_length);
            method.add_slot(
                GcSlotDesc::stack(offset, GcStackSlotBase::CallerSpRel, GcSlotFlags::BASE),
                &lifetime,
            );
        }

        assert!(method.slots.len() > 64);
        let bytes = method.encode::<Amd64Encoding>();
        check_all_offsets(&method, &bytes);
    }
}

#[test]
fn slim_header_scenario() {
    let mut method = Method::new(64);
    method.add_slot(
        GcSlotDesc::register(x64::RCX, GcSlotFlags::BASE),
        &[(0, true)],
    );
    method.add_slot(
        GcSlotDesc::register(x64::RDX, GcSlotFlags::BASE),
        &[(32, true)],
    );
    method.call_sites = vec![10, 40];

    let bytes = method.encode::<Amd64Encoding>();
    assert_eq!(0, bytes[0] & 1, "expected a slim header");

    let frame = Frame::new();
    let rd = frame.reg_display();
    let flags = CodeManagerFlags::ACTIVE_STACK_FRAME;

    let at_10 = live_roots::<X64>(&bytes, None, 10, &rd, flags);
    assert_eq!(
        vec![(frame.saved_register(x64::RCX).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits())],
        at_10
    );

    let at_40 = live_roots::<X64>(&bytes, None, 40, &rd, flags);
    assert_eq!(method.expected_roots(&frame, 40, true), at_40);
    assert_eq!(2, at_40.len());
}

#[test]
fn gs_cookie_valid_range() {
    let mut encoder = GcInfoEncoder::<Amd64Encoding>::new();
    encoder.set_code_length(64);
    encoder.set_gs_cookie_stack_slot(24, 4, 60);
    let bytes = encoder.build().expect("encoding failed");

    assert_eq!(1, bytes[0] & 1, "expected a fat header");

    let decoder = GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GS_COOKIE, 0);
    assert_eq!(Some(24), decoder.gs_cookie_stack_slot());
    assert_eq!((4, 60), decoder.gs_cookie_valid_range());

    let decoder =
        GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::PROLOG_LENGTH, 0);
    assert_eq!(4, decoder.prolog_size());
}

#[test]
fn gs_cookie_decode_reads_fewer_bytes() {
    let mut encoder = GcInfoEncoder::<Amd64Encoding>::new();
    encoder.set_code_length(4000);
    encoder.set_gs_cookie_stack_slot(24, 16, 3900);
    encoder.set_stack_base_register(x64::RBP);
    encoder.set_size_of_edit_and_continue_preserved_area(2048);
    encoder.set_reverse_pinvoke_frame_slot(-4096);
    encoder.set_size_of_stack_outgoing_and_scratch_area(256);
    encoder.define_call_sites(&(1..100).map(|idx| idx * 37).collect::<Vec<_>>());
    encoder.define_interruptible_range(3800, 50);
    let bytes = encoder.build().expect("encoding failed");

    let gs_only = GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GS_COOKIE, 0);
    let everything =
        GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::EVERYTHING, 0);

    assert_eq!(gs_only.gs_cookie_stack_slot(), everything.gs_cookie_stack_slot());
    assert_eq!(Some(-4096), everything.reverse_pinvoke_frame_stack_slot());
    assert_eq!(Some(2048), everything.size_of_edit_and_continue_preserved_area());
    assert_eq!(256, everything.size_of_stack_parameter_area());
    assert!(gs_only.num_bytes_read() < everything.num_bytes_read());
}

#[test]
fn forty_safe_points() {
    let call_sites: Vec<u32> = (0..40).map(|idx| 5 + idx * 9).collect();

    let mut method = Method::new(400);
    let lifetime: Vec<(u32, bool)> = call_sites
        .iter()
        .enumerate()
        .map(|(idx, &offset)| (offset, idx % 3 == 0))
        .collect();
    method.add_slot(GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE), &lifetime);
    method.add_slot(
        GcSlotDesc::stack(16, GcStackSlotBase::SpRel, GcSlotFlags::INTERIOR),
        &[(0, true), (200, false)],
    );
    method.call_sites = call_sites.clone();

    let bytes = method.encode::<Amd64Encoding>();
    check_all_offsets(&method, &bytes);

    for offset in 0..400 {
        let decoder =
            GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GC_LIFETIMES, offset);
        assert_eq!(call_sites.contains(&offset), decoder.is_safe_point(), "offset {}", offset);
    }
}

#[test]
fn chunk_boundaries() {
    let mut method = Method::new(220);
    method.ranges = vec![(0, 200)];
    method.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        &[
            (10, true),
            (63, false),
            (64, true),
            (65, false),
            (127, true),
            (128, false),
        ],
    );
    method.add_slot(
        GcSlotDesc::stack(16, GcStackSlotBase::SpRel, GcSlotFlags::BASE),
        &[(0, true), (100, false)],
    );
    method.add_slot(
        GcSlotDesc::stack(-8, GcStackSlotBase::CallerSpRel, GcSlotFlags::UNTRACKED),
        &[],
    );

    let bytes = method.encode::<Amd64Encoding>();
    check_all_offsets(&method, &bytes);

    // the last chunk has nothing live, only the untracked slot is left
    let frame = Frame::new();
    let rd = frame.reg_display();
    assert_eq!(
        1,
        live_roots::<X64>(&bytes, None, 195, &rd, CodeManagerFlags::ACTIVE_STACK_FRAME).len()
    );
}

#[test]
fn run_length_and_flat_live_states() {
    let mut method = Method::new(64);
    method.call_sites = vec![10, 20, 30];

    for idx in 0..100 {
        let lifetime = if idx < 50 {
            vec![(0, true)]
        } else {
            vec![(0, true), (15, false)]
        };
        method.add_slot(
            GcSlotDesc::stack(idx * 8, GcStackSlotBase::SpRel, GcSlotFlags::BASE),
            &lifetime,
        );
    }

    let bytes = method.encode::<Amd64Encoding>();
    check_all_offsets(&method, &bytes);

    let mut small = Method::new(64);
    small.call_sites = vec![10, 20];
    small.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        &[(5, true), (15, false)],
    );
    small.add_slot(
        GcSlotDesc::register(x64::R12, GcSlotFlags::BASE),
        &[(15, true)],
    );
    small.add_slot(
        GcSlotDesc::register(x64::R13, GcSlotFlags::BASE),
        &[(5, true)],
    );

    let bytes = small.encode::<Amd64Encoding>();
    check_all_offsets(&small, &bytes);
}

fn aborted_method() -> Method {
    let mut method = Method::new(80);
    method.ranges = vec![(20, 40)];
    method.call_sites = vec![10, 40];
    method.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        &[(0, true), (30, false)],
    );
    method.add_slot(
        GcSlotDesc::stack(32, GcStackSlotBase::SpRel, GcSlotFlags::UNTRACKED),
        &[],
    );
    method
}

#[test]
fn aborted_execution() {
    let method = aborted_method();
    let bytes = method.encode::<Amd64Encoding>();
    let frame = Frame::new();
    let rd = frame.reg_display();
    let aborted = CodeManagerFlags::EXECUTION_ABORTED;

    // outside the interruptible range nothing is known
    assert!(live_roots::<X64>(&bytes, None, 10, &rd, aborted).is_empty());
    assert_eq!(
        method.expected_roots(&frame, 10, true),
        live_roots::<X64>(&bytes, None, 10, &rd, CodeManagerFlags::empty())
    );

    for offset in [25, 40, 59] {
        assert_eq!(
            method.expected_roots(&frame, offset, true),
            live_roots::<X64>(&bytes, None, offset, &rd, aborted),
            "offset {}",
            offset
        );
    }
}

#[test]
fn funclet_parent_and_untracked_suppression() {
    let method = aborted_method();
    let bytes = method.encode::<Amd64Encoding>();
    let frame = Frame::new();
    let rd = frame.reg_display();

    assert!(
        live_roots::<X64>(
            &bytes,
            None,
            10,
            &rd,
            CodeManagerFlags::PARENT_OF_FUNCLET_STACK_FRAME
        )
        .is_empty()
    );

    assert_eq!(
        method.expected_roots(&frame, 10, false),
        live_roots::<X64>(&bytes, None, 10, &rd, CodeManagerFlags::NO_REPORT_UNTRACKED)
    );
}

#[test]
fn untracked_only_enumeration() {
    let method = aborted_method();
    let bytes = method.encode::<Amd64Encoding>();
    let frame = Frame::new();
    let rd = frame.reg_display();

    let decoder = GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GC_LIFETIMES, 0);
    let mut roots = RootSet::promotion();
    decoder.enumerate_untracked_slots(&rd, CodeManagerFlags::empty(), &mut roots);

    let expected: Vec<Root> = method
        .expected_roots(&frame, 0, true)
        .into_iter()
        .filter(|&(address, _)| address == frame.sp().offset(32).to_usize())
        .collect();
    assert_eq!(1, expected.len());
    assert_eq!(expected, sorted(&roots));
}

#[test]
fn scratch_slots_only_for_active_frame() {
    let mut method = Method::new(64);
    method.stack_area = 32;
    method.call_sites = vec![10];

    for desc in [
        GcSlotDesc::register(x64::RAX, GcSlotFlags::BASE),
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        GcSlotDesc::stack(8, GcStackSlotBase::SpRel, GcSlotFlags::BASE),
        GcSlotDesc::stack(64, GcStackSlotBase::SpRel, GcSlotFlags::BASE),
    ] {
        method.add_slot(desc, &[(0, true)]);
    }

    let bytes = method.encode::<Amd64Encoding>();
    let frame = Frame::new();
    let rd = frame.reg_display();

    let active = live_roots::<X64>(&bytes, None, 10, &rd, CodeManagerFlags::ACTIVE_STACK_FRAME);
    assert_eq!(method.expected_roots(&frame, 10, true), active);

    let parent = live_roots::<X64>(&bytes, None, 10, &rd, CodeManagerFlags::empty());
    let mut expected = vec![
        (frame.saved_register(x64::RBX).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits()),
        (frame.sp().offset(64).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits()),
    ];
    expected.sort_unstable();
    assert_eq!(expected, parent);
}

#[test]
fn untracked_slots_in_caller_outgoing_area() {
    let mut method = Method::new(64);
    method.stack_area = 32;
    method.call_sites = vec![10];
    method.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        &[(0, true)],
    );
    method.add_slot(
        GcSlotDesc::stack(8, GcStackSlotBase::SpRel, GcSlotFlags::UNTRACKED),
        &[],
    );

    let bytes = method.encode::<Amd64Encoding>();
    let frame = Frame::new();
    let rd = frame.reg_display();
    let expected = method.expected_roots(&frame, 10, true);
    assert_eq!(2, expected.len());

    let parent = live_roots::<X64>(&bytes, None, 10, &rd, CodeManagerFlags::empty());
    assert_eq!(expected, parent);

    let decoder = GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GC_LIFETIMES, 0);
    let mut roots = RootSet::promotion();
    decoder.enumerate_untracked_slots(&rd, CodeManagerFlags::empty(), &mut roots);
    assert_eq!(
        vec![(frame.sp().offset(8).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits())],
        sorted(&roots)
    );
}

#[test]
fn old_format_lifetimes_at_call_sites() {
    let mut method = Method::new(64);
    method.version = Some(3);
    method.call_sites = vec![12, 20];
    method.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::BASE),
        &[(0, true), (20, false)],
    );

    let bytes = method.encode::<Amd64Encoding>();
    let token = GcInfoToken::try_new(&bytes, 3).expect("supported version");

    let decoder = GcInfoDecoder::<X64>::new(token, DecodeFlags::GC_LIFETIMES, 11);
    assert_eq!(Some(0), decoder.safe_point_index());
    let decoder = GcInfoDecoder::<X64>::new(token, DecodeFlags::GC_LIFETIMES, 19);
    assert_eq!(Some(1), decoder.safe_point_index());
    let decoder = GcInfoDecoder::<X64>::new(token, DecodeFlags::GC_LIFETIMES, 12);
    assert_eq!(None, decoder.safe_point_index());

    // interruptibility queries take the return offset
    assert!(GcInfoDecoder::<X64>::new(token, DecodeFlags::INTERRUPTIBILITY, 12).is_safe_point());

    let frame = Frame::new();
    let rd = frame.reg_display();
    let flags = CodeManagerFlags::empty();

    assert_eq!(
        vec![(frame.saved_register(x64::RBX).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits())],
        live_roots::<X64>(&bytes, Some(3), 11, &rd, flags)
    );
    assert!(live_roots::<X64>(&bytes, Some(3), 19, &rd, flags).is_empty());
}

#[test]
fn registers_without_saved_location_are_skipped() {
    let mut encoder = GcInfoEncoder::<ArmEncoding>::new();
    encoder.set_code_length(64);
    let reg = encoder.get_register_slot_id(arm::R4, GcSlotFlags::BASE);
    let stack = encoder.get_stack_slot_id(-8, GcSlotFlags::BASE, GcStackSlotBase::CallerSpRel);
    encoder.set_slot_state(0, reg, GcSlotState::Live);
    encoder.set_slot_state(0, stack, GcSlotState::Live);
    encoder.define_call_sites(&[10]);
    let bytes = encoder.build().expect("encoding failed");

    let frame = Frame::new();
    let rd = RegDisplay::new(frame.sp(), frame.sp().offset(CALLER_SP_OFFSET));

    let decoder = GcInfoDecoder::<Arm>::new(GcInfoToken::new(&bytes), DecodeFlags::GC_LIFETIMES, 10);
    let mut roots = RootSet::promotion();
    decoder.enumerate_live_slots(&rd, CodeManagerFlags::ACTIVE_STACK_FRAME, &mut roots);

    assert_eq!(
        vec![(
            frame.sp().offset(CALLER_SP_OFFSET - 8).to_usize(),
            GcCallFlags::CHECK_APP_DOMAIN.bits()
        )],
        sorted(&roots)
    );
}

#[test]
fn captured_registers_are_pinned() {
    let mut method = Method::new(64);
    method.call_sites = vec![10];
    method.add_slot(
        GcSlotDesc::register(x64::RBX, GcSlotFlags::INTERIOR),
        &[(0, true)],
    );
    let bytes = method.encode::<Amd64Encoding>();

    let rd = RegDisplay::new(Address::from(0x1000), Address::from(0x2000));
    let captured = Address::from_ptr(&rd.current_context.regs[x64::RBX as usize]);

    let decoder =
        GcInfoDecoder::<X64>::new(GcInfoToken::new(&bytes), DecodeFlags::GC_LIFETIMES, 10);

    let mut promotion = RootSet::promotion();
    decoder.enumerate_live_slots(&rd, CodeManagerFlags::empty(), &mut promotion);
    let expected_flags =
        GcCallFlags::INTERIOR | GcCallFlags::PINNED | GcCallFlags::CHECK_APP_DOMAIN;
    assert_eq!(
        vec![(captured.to_usize(), expected_flags.bits())],
        sorted(&promotion)
    );

    let mut relocation = RootSet::relocation();
    decoder.enumerate_live_slots(&rd, CodeManagerFlags::empty(), &mut relocation);
    assert!(relocation.roots.is_empty());
}

#[test]
fn arm64_normalized_offsets() {
    let frame = Frame::new();
    let mut rd = RegDisplay::new(frame.sp(), frame.sp().offset(CALLER_SP_OFFSET));
    rd.current_context_pointers
        .set(arm64::X19, frame.saved_register(arm64::X19));

    let mut encoder = GcInfoEncoder::<Arm64Encoding>::new();
    encoder.set_code_length(256);
    let reg = encoder.get_register_slot_id(arm64::X19, GcSlotFlags::BASE);
    let stack = encoder.get_stack_slot_id(16, GcSlotFlags::BASE, GcStackSlotBase::SpRel);
    encoder.set_slot_state(0, stack, GcSlotState::Live);
    encoder.set_slot_state(64, reg, GcSlotState::Live);
    encoder.define_call_sites(&[32, 96]);
    encoder.define_interruptible_range(128, 64);
    let bytes = encoder.build().expect("encoding failed");

    let reg_root = (
        frame.saved_register(arm64::X19).to_usize(),
        GcCallFlags::CHECK_APP_DOMAIN.bits(),
    );
    let stack_root = (frame.sp().offset(16).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits());
    let mut both = vec![reg_root, stack_root];
    both.sort_unstable();

    assert_eq!(
        vec![stack_root],
        live_roots::<Arm64>(&bytes, None, 32, &rd, CodeManagerFlags::empty())
    );
    assert_eq!(
        both,
        live_roots::<Arm64>(&bytes, None, 96, &rd, CodeManagerFlags::empty())
    );
    assert_eq!(
        both,
        live_roots::<Arm64>(&bytes, None, 160, &rd, CodeManagerFlags::empty())
    );
}

#[test]
fn interpreter_frames() {
    let frame = Frame::new();
    let mut rd = RegDisplay::new(frame.sp(), frame.sp().offset(CALLER_SP_OFFSET));
    rd.current_context.regs[interp::FP as usize] = frame.sp().offset(FRAME_OFFSET).to_usize();

    let mut encoder = GcInfoEncoder::<InterpreterEncoding>::new();
    encoder.set_code_length(100);
    encoder.set_stack_base_register(interp::FP);
    let local = encoder.get_stack_slot_id(-16, GcSlotFlags::BASE, GcStackSlotBase::FrameRegRel);
    encoder.get_stack_slot_id(
        24,
        GcSlotFlags::UNTRACKED | GcSlotFlags::INTERIOR,
        GcStackSlotBase::FrameRegRel,
    );
    encoder.set_slot_state(20, local, GcSlotState::Live);
    encoder.define_call_sites(&[10, 50]);
    let bytes = encoder.build().expect("encoding failed");

    let fp = frame.sp().offset(FRAME_OFFSET);
    let untracked = (
        fp.offset(24).to_usize(),
        (GcCallFlags::INTERIOR | GcCallFlags::CHECK_APP_DOMAIN).bits(),
    );
    let local = (fp.ioffset(-16).to_usize(), GcCallFlags::CHECK_APP_DOMAIN.bits());
    let mut both = vec![untracked, local];
    both.sort_unstable();

    assert_eq!(
        vec![untracked],
        live_roots::<Interpreter>(&bytes, None, 10, &rd, CodeManagerFlags::empty())
    );
    assert_eq!(
        both,
        live_roots::<Interpreter>(&bytes, None, 50, &rd, CodeManagerFlags::empty())
    );
}

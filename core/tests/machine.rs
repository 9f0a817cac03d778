//! End-to-end machine tests: boot a real program from disk, pump frames,
//! crash it, reboot it.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use minnow_core::memory::{INPUT_BASE, PALETTE_MAP_BASE};
use minnow_core::{InputSnapshot, Machine, MachineConfig, MachineState, SurfaceId};

fn write_boot(dir: &Path, source: &str) {
    fs::create_dir_all(dir.join("system")).unwrap();
    fs::write(dir.join("system/boot.mns"), source).unwrap();
}

fn config(dir: &Path) -> MachineConfig {
    let mut config = MachineConfig::workstation(dir);
    // keep test surfaces small
    config.os_width = 320;
    config.os_height = 200;
    config.game_width = 64;
    config.game_height = 64;
    config
}

fn machine_with(dir: &Path, boot: &str) -> Machine {
    write_boot(dir, boot);
    let mut machine = Machine::new(config(dir)).unwrap();
    machine.boot();
    machine
}

#[test]
fn boot_update_render_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _init()
            poke(0x4200, 7)
        end
        function _update(dt)
            poke(0x4201, peek(0x4201) + 1)
        end
        function _draw()
            cls(8)
            rect(10, 10, 5, 5, 7)
        end
        ",
    );
    assert_eq!(machine.state(), MachineState::Running);
    assert_eq!(machine.bus().mem.peek(0x4200), 7);

    machine.update(0.016);
    machine.update(0.016);
    assert_eq!(machine.bus().mem.peek(0x4201), 2);

    machine.render();
    assert_eq!(machine.draw_mode(), minnow_core::renderer::DrawMode::Idle);
    let os = machine.surface(SurfaceId::Os);
    // cls(8) is the stock red, rect color 7 the stock white
    assert_eq!(os.pixel(0, 0), [0xFF, 0x00, 0x4D, 0xFF]);
    assert_eq!(os.pixel(12, 12), [0xFF, 0xF1, 0xE8, 0xFF]);
}

#[test]
fn runaway_update_times_out_and_faults() {
    let dir = tempfile::tempdir().unwrap();
    write_boot(
        dir.path(),
        "
        function _update()
            while true do end
        end
        function _draw()
            poke(0x4200, 1)
        end
        ",
    );
    let mut cfg = config(dir.path());
    cfg.cpu_budget_ms = 50.0;
    let mut machine = Machine::new(cfg).unwrap();
    machine.boot();
    assert_eq!(machine.state(), MachineState::Running);

    let started = Instant::now();
    machine.update(0.016);
    // well past the 50 ms budget yet cut off long before a frame's worth of
    // seconds
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(machine.state(), MachineState::Faulted);
    assert!(machine.fault_message().unwrap().contains("cpu limit"));

    // the fault display renders instead of the guest draw hook
    machine.render();
    assert_eq!(machine.bus().mem.peek(0x4200), 0);
    let os = machine.surface(SurfaceId::Os);
    assert_eq!(os.pixel(0, 0), [0x33, 0x00, 0x00, 0xFF]);
}

#[test]
fn runtime_fault_then_reboot_preserves_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _init()
            poke(0x4300, peek(0x4300) + 1)
        end
        function _update()
            if peek(0x4301) == 1 then
                explode()
            end
        end
        ",
    );
    machine.update(0.016); // healthy frame
    assert_eq!(machine.state(), MachineState::Running);

    machine.bus_mut().mem.poke(0x4301, 1);
    machine.update(0.016);
    assert_eq!(machine.state(), MachineState::Faulted);
    assert!(machine
        .fault_message()
        .unwrap()
        .contains("attempt to call a nil value"));

    // while faulted, update only watches for the reboot chord
    machine.bus_mut().mem.poke(0x4301, 0);
    machine.update(0.016);
    assert_eq!(machine.state(), MachineState::Faulted);

    machine.set_input_snapshot(InputSnapshot {
        reboot: true,
        ..Default::default()
    });
    machine.update(0.016);
    assert_eq!(machine.state(), MachineState::Running);
    assert!(machine.fault_message().is_none());
    // RAM persisted across the reboot: _init has now bumped the counter twice
    assert_eq!(machine.bus().mem.peek(0x4300), 2);
}

#[test]
fn reboot_resets_the_palette_map_but_not_user_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(dir.path(), "function _init() end");
    machine.bus_mut().mem.poke(PALETTE_MAP_BASE + 5, 9);
    machine.bus_mut().mem.poke(0x4200, 123);
    machine.reboot();
    assert_eq!(machine.state(), MachineState::Running);
    assert_eq!(machine.bus().mem.peek(PALETTE_MAP_BASE + 5), 5);
    assert_eq!(machine.bus().mem.peek(0x4200), 123);
}

#[test]
fn missing_boot_script_faults_with_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = Machine::new(config(dir.path())).unwrap();
    machine.boot();
    assert_eq!(machine.state(), MachineState::Faulted);
    assert!(machine
        .fault_message()
        .unwrap()
        .contains("system/boot.mns"));
    // rendering while faulted shows the fault screen, not a crash
    machine.render();
    assert_eq!(
        machine.surface(SurfaceId::Os).pixel(0, 0),
        [0x33, 0x00, 0x00, 0xFF]
    );
}

#[test]
fn compile_error_at_boot_faults() {
    let dir = tempfile::tempdir().unwrap();
    let machine = machine_with(dir.path(), "function _init( end");
    assert_eq!(machine.state(), MachineState::Faulted);
    assert!(machine.fault_message().unwrap().contains("compile error"));
}

#[test]
fn modules_load_once_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("counter.mns"),
        "
        hits = (hits or 0) + 1
        poke(0x4210, hits)
        return { n = 42 }
        ",
    )
    .unwrap();
    let machine = machine_with(
        dir.path(),
        "
        local a = require('counter')
        local b = require('counter')
        function _init()
            poke(0x4200, a.n + b.n)
        end
        ",
    );
    assert_eq!(machine.state(), MachineState::Running);
    // the module body executed exactly once
    assert_eq!(machine.bus().mem.peek(0x4210), 1);
    assert_eq!(machine.bus().mem.peek(0x4200), 84);
}

#[test]
fn missing_module_faults_with_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let machine = machine_with(dir.path(), "require('no.such.module')");
    assert_eq!(machine.state(), MachineState::Faulted);
    assert!(machine
        .fault_message()
        .unwrap()
        .contains("no/such/module.mns"));
}

#[test]
fn input_snapshot_reaches_guest_and_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _update()
            if btn(4) then poke(0x4200, 1) end
            local m = mouse()
            poke2(0x4202, m.x)
        end
        ",
    );
    let mut snap = InputSnapshot::default();
    snap.buttons[4] = true;
    snap.pointer_x = 55;
    snap.pointer_y = 21;
    snap.pointer_left = true;
    machine.set_input_snapshot(snap);
    machine.update(0.016);

    assert_eq!(machine.bus().mem.peek(0x4200), 1);
    assert_eq!(machine.bus().mem.peek16(0x4202), 55);
    // the snapshot is also mirrored into the input region
    assert_eq!(machine.bus().mem.peek(INPUT_BASE + 4), 1);
    assert_eq!(machine.bus().mem.peek16(INPUT_BASE + 16), 55);
    assert_eq!(machine.bus().mem.peek16(INPUT_BASE + 18), 21);
    assert_eq!(machine.bus().mem.peek(INPUT_BASE + 20), 1);
}

#[test]
fn tile_grid_round_trips_through_the_guest() {
    let dir = tempfile::tempdir().unwrap();
    let machine = machine_with(
        dir.path(),
        "
        function _init()
            mset(5, 5, 9)
            poke(0x4200, mget(5, 5))
            mset(-1, 5, 1)
            poke(0x4201, mget(-1, 5))
        end
        ",
    );
    assert_eq!(machine.bus().mem.peek(0x4200), 9);
    assert_eq!(machine.bus().mem.peek(0x4201), 0);
}

#[test]
fn surfaces_compose_and_leave_no_open_mode() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _draw()
            target('game')
            cls(11)
            target('os')
            draw_game(0, 0, 32, 32)
        end
        ",
    );
    machine.render();
    assert_eq!(machine.draw_mode(), minnow_core::renderer::DrawMode::Idle);
    let os = machine.surface(SurfaceId::Os);
    // the scaled game surface (stock green) landed in the corner
    assert_eq!(os.pixel(0, 0), [0x00, 0xE4, 0x36, 0xFF]);
    assert_eq!(os.pixel(31, 31), [0x00, 0xE4, 0x36, 0xFF]);
    // outside it, the frame backdrop (palette slot 16) shows through
    assert_eq!(os.pixel(100, 100), [0x29, 0x22, 0x2E, 0xFF]);
}

#[test]
fn palette_swap_changes_what_a_logical_color_draws() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _draw()
            poke(0x5F00 + 7, 8) -- logical 7 now draws the stock red
            rect(0, 0, 4, 4, 7)
        end
        ",
    );
    machine.render();
    assert_eq!(
        machine.surface(SurfaceId::Os).pixel(1, 1),
        [0xFF, 0x00, 0x4D, 0xFF]
    );
}

#[test]
fn sprite_sheet_saves_a_png_into_the_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(dir.path(), "function _init() sset(0, 0, 8) end");
    assert!(machine.save_sprite_sheet("shots/sheet.png"));
    let bytes = fs::read(dir.path().join("shots/sheet.png")).unwrap();
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn sprite_edits_show_only_after_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut machine = machine_with(
        dir.path(),
        "
        function _init()
            sset(0, 0, 8)
        end
        function _draw()
            cls(1)
            if peek(0x4200) == 1 then refresh_sprites() end
            spr(0, 0, 0)
        end
        ",
    );
    machine.render();
    // stale texture: the edited pixel is still transparent, backdrop shows
    let before = machine.surface(SurfaceId::Os).pixel(0, 0);
    assert_eq!(before, [0x1D, 0x2B, 0x53, 0xFF]);

    machine.bus_mut().mem.poke(0x4200, 1);
    machine.render();
    let after = machine.surface(SurfaceId::Os).pixel(0, 0);
    assert_eq!(after, [0xFF, 0x00, 0x4D, 0xFF]);
}

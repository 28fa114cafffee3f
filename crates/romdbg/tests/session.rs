//! Session persistence scenarios across the store, engine and record files.

use std::fs;
use std::path::{Path, PathBuf};

use romdbg::{
    BootOutcome, BreakpointId, ExecutionEngine, GuardSize, MemoryGuard, Session, SessionConfig,
    SessionOptions, ShadowEngine, compute_checksum,
};
use serde_json::{Value, json};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    image: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("saves")).expect("save dir");
        let image = dir.path().join("game.bin");
        fs::write(&image, b"NEO-GEO program rom").expect("write image");
        Self { dir, image }
    }

    fn save_dir(&self) -> PathBuf {
        self.dir.path().join("saves")
    }

    fn primary(&self) -> PathBuf {
        self.save_dir().join("game.bin.json")
    }

    fn legacy(&self) -> PathBuf {
        self.save_dir().join("game.bin-romdbg-debug.json")
    }

    fn checksum(&self) -> u64 {
        compute_checksum(&self.image).expect("checksum")
    }

    fn session(&self) -> Session<ShadowEngine> {
        let options = SessionOptions {
            save_dir: Some(self.save_dir()),
            ..SessionOptions::default()
        };
        Session::new(ShadowEngine::new(), options)
    }

    fn write_record(&self, path: &Path, record: &Value) {
        fs::write(path, serde_json::to_string_pretty(record).expect("json")).expect("write record");
    }

    fn read_record(&self) -> Value {
        serde_json::from_str(&fs::read_to_string(self.primary()).expect("read record"))
            .expect("parse record")
    }
}

fn record(checksum: u64) -> Value {
    json!({
        "rom_checksum": checksum,
        "rom_filename": "game.bin.json",
        "config": {"elf": "/build/game.elf", "source": "/build/src", "toolchain_prefix": "m68k-elf-"},
        "breakpoints": [
            {"addr": 0x1000, "enabled": true},
            {"addr": 0x2000, "enabled": false}
        ],
        "protects": [
            {"addr": 0x10_0000, "size_bits": 16, "mode": 0, "value": 0, "enabled": true},
            {"addr": 0x10_0010, "size_bits": 8, "mode": 1, "value": 99, "enabled": false},
            {"addr": 0x10_0020, "size_bits": 32, "mode": 1, "value": 7, "enabled": true}
        ]
    })
}

fn addresses(session: &Session<ShadowEngine>) -> Vec<u32> {
    session.store().breakpoints().iter().map(|bp| bp.address).collect()
}

#[test]
fn test_matching_checksum_restores_state() {
    let fx = Fixture::new();
    fx.write_record(&fx.primary(), &record(fx.checksum()));

    let mut session = fx.session();
    let outcome = session.load_runtime_state_on_boot(&fx.image);
    assert_eq!(
        outcome,
        BootOutcome::Applied {
            breakpoints: 2,
            guards: 3
        }
    );

    assert_eq!(addresses(&session), vec![0x1000, 0x2000]);
    assert_eq!(session.engine().breakpoints(), vec![0x1000]);
    assert_eq!(session.engine().guards().len(), 3);
    assert_eq!(session.engine().guard_mask(), 0b101);
    assert_eq!(session.store().guard_enabled_mask(), 0b101);
    assert_eq!(session.store().guard(1).map(|g| g.value), Some(99));
}

#[test]
fn test_stale_checksum_clears_everything() {
    let fx = Fixture::new();
    let actual = fx.checksum();
    fx.write_record(&fx.primary(), &record(actual ^ 0xffff));

    let mut session = fx.session();
    session.add_breakpoint(0x4000, true);
    session
        .add_guard(MemoryGuard::block_write(0x20_0000, GuardSize::Byte))
        .expect("guard");

    let outcome = session.load_runtime_state_on_boot(&fx.image);
    assert_eq!(
        outcome,
        BootOutcome::Stale {
            stored: actual ^ 0xffff,
            actual
        }
    );
    assert!(session.store().is_empty());
    assert!(session.store().guards().is_empty());
    assert!(session.engine().breakpoints().is_empty());
    assert!(session.engine().guards().is_empty());
}

#[test]
fn test_repeated_address_keeps_first_entry_in_engine() {
    let fx = Fixture::new();
    let mut rec = record(fx.checksum());
    rec["breakpoints"] = json!([
        {"addr": 0x1000, "enabled": false},
        {"addr": 0x1000, "enabled": true},
        {"addr": 0x2000, "enabled": true},
        {"addr": 0x2000, "enabled": false}
    ]);
    fx.write_record(&fx.primary(), &rec);

    let mut session = fx.session();
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());
    assert_eq!(addresses(&session), vec![0x1000, 0x2000]);

    let armed: Vec<u32> = session
        .store()
        .breakpoints()
        .iter()
        .filter(|bp| bp.enabled)
        .map(|bp| bp.address)
        .collect();
    assert_eq!(armed, vec![0x2000]);
    assert_eq!(session.engine().breakpoints(), armed);
}

#[test]
fn test_zero_checksum_is_trusted() {
    let fx = Fixture::new();
    fx.write_record(&fx.primary(), &record(0));

    let mut session = fx.session();
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());
    assert_eq!(addresses(&session), vec![0x1000, 0x2000]);
}

#[test]
fn test_no_guards_persisted_leaves_mask_alone() {
    let fx = Fixture::new();
    let mut rec = record(fx.checksum());
    rec["protects"] = json!([]);
    fx.write_record(&fx.primary(), &rec);

    let mut session = fx.session();
    session.engine_mut().set_guard_enabled_mask(0b1);
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());
    // Cleared along with the guards, but never re-applied.
    assert_eq!(session.engine().guard_mask(), 0);
    assert!(session.engine().guards().is_empty());
}

#[test]
fn test_malformed_record_is_discarded() {
    let fx = Fixture::new();
    fs::write(fx.primary(), "{\"rom_checksum\": 1, \"breakpoints\": [").expect("write");

    let mut session = fx.session();
    let id = session.add_breakpoint(0x4000, true);
    assert_eq!(
        session.load_runtime_state_on_boot(&fx.image),
        BootOutcome::Malformed
    );
    assert!(session.store().get(id).is_some());
    assert_eq!(session.engine().breakpoints(), vec![0x4000]);
    assert!(!session.load_config_defaults(&fx.image));
}

#[test]
fn test_unreadable_image_changes_nothing() {
    let fx = Fixture::new();
    fx.write_record(&fx.primary(), &record(0));
    let missing = fx.dir.path().join("game.bin");
    fs::remove_file(&missing).expect("remove image");

    let mut session = fx.session();
    session.add_breakpoint(0x4000, true);
    assert_eq!(
        session.load_runtime_state_on_boot(&missing),
        BootOutcome::ChecksumUnavailable
    );
    assert_eq!(addresses(&session), vec![0x4000]);
    assert!(session.save_on_exit().is_err());
}

#[test]
fn test_no_record() {
    let fx = Fixture::new();
    let mut session = fx.session();
    assert_eq!(
        session.load_runtime_state_on_boot(&fx.image),
        BootOutcome::NoRecord
    );
    assert!(!session.load_config_defaults(&fx.image));
}

#[test]
fn test_legacy_record_fallback() {
    let fx = Fixture::new();
    fx.write_record(&fx.legacy(), &record(fx.checksum()));
    let legacy_before = fs::read(fx.legacy()).expect("read legacy");

    let mut session = fx.session();
    assert!(session.load_config_defaults(&fx.image));
    assert_eq!(
        session.config().elf.as_deref(),
        Some(Path::new("/build/game.elf"))
    );
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());
    assert_eq!(addresses(&session), vec![0x1000, 0x2000]);

    session.add_breakpoint(0x3000, true);
    let written = session.save_on_exit().expect("save");
    assert_eq!(written, fx.primary());
    assert_eq!(fs::read(fx.legacy()).expect("read legacy"), legacy_before);

    let saved = fx.read_record();
    assert_eq!(saved["breakpoints"].as_array().map(Vec::len), Some(3));
    assert_eq!(saved["config"]["toolchain_prefix"], "m68k-elf-");
}

#[test]
fn test_config_defaults_override_only_present_fields() {
    let fx = Fixture::new();
    fx.write_record(
        &fx.primary(),
        &json!({"config": {"elf": "/build/game.elf"}}),
    );

    let mut session = fx.session();
    session.set_config(SessionConfig {
        elf: Some("/old/game.elf".into()),
        source_dir: Some("/old/src".into()),
        toolchain_prefix: Some("m68k-amigaos-".to_string()),
    });
    assert!(session.load_config_defaults(&fx.image));
    assert_eq!(
        session.config(),
        &SessionConfig {
            elf: Some("/build/game.elf".into()),
            source_dir: Some("/old/src".into()),
            toolchain_prefix: Some("m68k-amigaos-".to_string()),
        }
    );
    assert!(session.store().is_empty());
}

#[test]
fn test_end_to_end_resave_is_stable() {
    let fx = Fixture::new();
    let checksum = fx.checksum();
    let mut rec = record(checksum);
    rec["protects"] = json!([]);
    fx.write_record(&fx.primary(), &rec);

    let mut session = fx.session();
    session.load_config_defaults(&fx.image);
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());

    let bps = session.store().breakpoints();
    assert_eq!(bps.len(), 2);
    assert_eq!((bps[0].id, bps[0].address, bps[0].enabled), (BreakpointId(1), 0x1000, true));
    assert_eq!((bps[1].id, bps[1].address, bps[1].enabled), (BreakpointId(2), 0x2000, false));
    // No helper for /build/game.elf: locations stay unknown, not an error.
    assert!(!session.store_mut().resolve_location(BreakpointId(1)));

    session.save_on_exit().expect("save");
    let saved = fx.read_record();
    assert_eq!(saved["breakpoints"], rec["breakpoints"]);
    assert_eq!(saved["rom_checksum"], checksum);
    assert_eq!(saved["rom_filename"], "game.bin.json");
    assert_eq!(saved["config"], rec["config"]);
}

#[test]
fn test_resave_recomputes_checksum() {
    let fx = Fixture::new();
    fx.write_record(&fx.primary(), &record(0));

    let mut session = fx.session();
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());
    session.save_on_exit().expect("save");
    assert_eq!(fx.read_record()["rom_checksum"], fx.checksum());

    // Rebuilt image: the record no longer matches.
    fs::write(&fx.image, b"patched program rom").expect("rewrite image");
    let mut session = fx.session();
    assert!(matches!(
        session.load_runtime_state_on_boot(&fx.image),
        BootOutcome::Stale { .. }
    ));
}

#[test]
fn test_guards_round_trip_through_session() {
    let fx = Fixture::new();
    let mut session = fx.session();
    session.load_config_defaults(&fx.image);
    session
        .add_guard(MemoryGuard::block_write(0xff10_0000, GuardSize::Word))
        .expect("guard");
    session
        .add_guard(MemoryGuard::force_value(0x10_0002, GuardSize::Byte, 3).with_enabled(false))
        .expect("guard");
    session.save_on_exit().expect("save");

    let saved = fx.read_record();
    assert_eq!(
        saved["protects"],
        json!([
            {"addr": 0x10_0000, "size_bits": 16, "mode": 0, "value": 0, "enabled": true},
            {"addr": 0x10_0002, "size_bits": 8, "mode": 1, "value": 3, "enabled": false}
        ])
    );

    let mut restored = fx.session();
    assert!(restored.load_runtime_state_on_boot(&fx.image).is_applied());
    assert_eq!(restored.engine().guard_mask(), 0b01);
    assert_eq!(restored.store().guards(), session.store().guards());
}

#[test]
fn test_save_settings_keeps_tables_and_updates_active_config() {
    let fx = Fixture::new();
    fx.write_record(&fx.primary(), &record(fx.checksum()));

    let mut session = fx.session();
    session.load_config_defaults(&fx.image);
    let config = SessionConfig {
        elf: Some("/new/game.elf".into()),
        source_dir: None,
        toolchain_prefix: None,
    };
    let written = session
        .save_settings_for_image(&fx.image, &config)
        .expect("save settings");
    assert_eq!(written.breakpoints.len(), 2);
    assert_eq!(written.protects.len(), 3);
    assert_eq!(session.config(), &config);

    let saved = fx.read_record();
    assert_eq!(saved["config"], json!({"elf": "/new/game.elf", "source": "", "toolchain_prefix": ""}));
    assert_eq!(saved["breakpoints"], record(0)["breakpoints"]);

    // Another image's settings leave the active config alone.
    let other = fx.dir.path().join("other.bin");
    fs::write(&other, b"other").expect("write other");
    session
        .save_settings_for_image(&other, &SessionConfig::default())
        .expect("save other");
    assert_eq!(session.config(), &config);
    assert!(fx.save_dir().join("other.bin.json").is_file());
}

#[cfg(unix)]
#[test]
fn test_boot_resolves_locations_through_helper() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    let elf = fx.dir.path().join("game.elf");
    fs::write(&elf, b"\x7fELF").expect("write elf");
    let script = fx.dir.path().join("fake-addr2line");
    fs::write(
        &script,
        "#!/bin/sh\nwhile read -r addr; do\n  printf '%s\\nmain\\n/build/src/main.c:%d\\n' \"$addr\" \"$(($addr))\"\ndone\n",
    )
    .expect("write script");
    let mut perms = fs::metadata(&script).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).expect("chmod");

    let mut rec = record(fx.checksum());
    rec["config"]["elf"] = json!(elf.to_string_lossy());
    fx.write_record(&fx.primary(), &rec);

    let mut session = fx.session();
    session.load_config_defaults(&fx.image);
    session
        .store_mut()
        .resolver_mut()
        .set_locator(move |_: &str| Some(script.clone()));
    assert!(session.load_runtime_state_on_boot(&fx.image).is_applied());

    let entries: Vec<String> = session
        .store()
        .breakpoints()
        .iter()
        .map(|bp| romdbg::format_entry(bp, session.source_root().as_deref()))
        .collect();
    assert_eq!(
        entries,
        vec!["#1 main.c:4096 (enabled)", "#2 main.c:8192 (disabled)"]
    );
}

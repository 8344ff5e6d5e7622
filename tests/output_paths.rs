//! Output path derivation: override priority, synthesized names and the
//! auxiliary outputs that ride along.

use std::fs;
use std::path::Path;

use kemudi::driver::Driver;
use kemudi::file_type::FileType;
use kemudi::test_utils::{cli_for, count_jobs};

#[test]
fn test_output_file_map_entry_wins_over_everything() {
    let dir = tempfile::tempdir().unwrap();
    let map_path = dir.path().join("outputs.json");
    fs::write(
        &map_path,
        r#"{ "a.km": { "object": "mapped/a.o", "dependencies": "mapped/a.d" } }"#,
    )
    .unwrap();

    let mut cli = cli_for(&["a.km"]);
    cli.compile_only = true;
    cli.emit_dependencies = true;
    // Even an explicit -o loses to the map entry.
    cli.output_file = Some("explicit.o".into());
    cli.output_file_map = Some(map_path);
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, job) = compilation.jobs().iter().next().unwrap();
    assert_eq!(job.output.primary(), Some(Path::new("mapped/a.o")));
    assert_eq!(
        job.output.auxiliary(FileType::Dependencies),
        Some(Path::new("mapped/a.d"))
    );
}

#[test]
fn test_malformed_output_file_map_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let map_path = dir.path().join("outputs.json");
    fs::write(&map_path, "not json at all").unwrap();

    let mut cli = cli_for(&["a.km"]);
    cli.compile_only = true;
    cli.output_file_map = Some(map_path);
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver.diagnostics().has_errors());
}

#[test]
fn test_explicit_output_path_is_used_for_the_link() {
    let mut cli = cli_for(&["a.km"]);
    cli.output_file = Some("bin/tool".into());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, link) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .unwrap();
    assert_eq!(link.output.primary(), Some(Path::new("bin/tool")));
}

#[test]
fn test_dynamic_library_is_named_after_the_module() {
    let mut cli = cli_for(&["a.km"]);
    cli.emit_library = true;
    cli.module_name = Some("App".to_string());
    cli.target = Some("x86_64-unknown-linux-gnu".to_string());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, link) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .unwrap();
    assert_eq!(link.output.primary(), Some(Path::new("libApp.so")));
    assert!(link.arguments.iter().any(|a| a == "-shared"));
}

#[test]
fn test_executable_name_falls_back_to_the_input_stem() {
    // No -o and no --module-name: the synthesized module name is not a
    // user-chosen image name, so the image takes the input's stem.
    let cli = cli_for(&["tool.km"]);
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, link) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .unwrap();
    assert_eq!(link.output.primary(), Some(Path::new("tool")));
}

#[test]
fn test_merge_module_lands_next_to_the_output() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_executable = true;
    cli.output_file = Some("bin/app".into());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, merge) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .unwrap();
    assert_eq!(merge.output.primary(), Some(Path::new("bin/app.kmod")));
    // The module-doc path always shadows the module path.
    assert_eq!(
        merge.output.auxiliary(FileType::ModuleDoc),
        Some(Path::new("bin/app.kdoc"))
    );
}

#[test]
fn test_explicit_module_path_overrides_the_synthesized_one() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_module_path = Some("out/custom.kmod".into());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, merge) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .unwrap();
    assert_eq!(merge.output.primary(), Some(Path::new("out/custom.kmod")));
    assert_eq!(
        merge.output.auxiliary(FileType::ModuleDoc),
        Some(Path::new("out/custom.kdoc"))
    );
}

#[test]
fn test_sole_compile_carries_the_module_as_auxiliary() {
    // With one compile action there is nothing to merge; the module is an
    // auxiliary output of the compile itself.
    let mut cli = cli_for(&["a.km"]);
    cli.emit_module = true;
    cli.emit_module_path = Some("a_mod.kmod".into());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "merge-module"), 0);
    assert_eq!(count_jobs(&compilation, "compile"), 1);
    let (_, job) = compilation.jobs().iter().next().unwrap();
    assert_eq!(
        job.output.auxiliary(FileType::Module),
        Some(Path::new("a_mod.kmod"))
    );
    assert_eq!(
        job.output.auxiliary(FileType::ModuleDoc),
        Some(Path::new("a_mod.kdoc"))
    );
}

#[test]
fn test_partial_modules_feed_the_merge() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_executable = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let mut partials = Vec::new();
    for (_, job) in compilation.jobs().iter() {
        if compilation.actions()[job.source].kind.name() == "compile" {
            let partial = job.output.auxiliary(FileType::Module).unwrap();
            assert!(compilation.temp_files().contains(&partial.to_path_buf()));
            partials.push(partial.display().to_string());
        }
    }
    assert_eq!(partials.len(), 2);
    let (_, merge) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .unwrap();
    for partial in partials {
        assert!(merge.arguments.iter().any(|a| *a == partial));
    }
}

#[test]
fn test_debug_symbols_follow_the_image_path() {
    let mut cli = cli_for(&["a.km"]);
    cli.debug_info = true;
    cli.output_file = Some("bin/app".into());
    cli.target = Some("x86_64-unknown-linux-gnu".to_string());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, dsym) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| {
            compilation.actions()[job.source].kind.name() == "generate-debug-symbols"
        })
        .unwrap();
    assert_eq!(dsym.output.primary(), Some(Path::new("bin/app.debug")));
    assert_eq!(dsym.executable, Path::new("objcopy"));
}

#[test]
fn test_header_request_lands_on_the_module_producer() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_header = true;
    cli.emit_header_path = Some("include/app.h".into());
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, merge) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .unwrap();
    assert_eq!(
        merge.output.auxiliary(FileType::Header),
        Some(Path::new("include/app.h"))
    );
    // The compiles do not each emit a header of their own.
    for (_, job) in compilation.jobs().iter() {
        if compilation.actions()[job.source].kind.name() == "compile" {
            assert_eq!(job.output.auxiliary(FileType::Header), None);
        }
    }
}

#[test]
fn test_stale_diagnostics_files_are_deleted_eagerly() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.km");
    fs::write(&source, "").unwrap();
    let map_path = dir.path().join("outputs.json");
    let stale = dir.path().join("a.dia");
    fs::write(&stale, "left over from last time").unwrap();
    fs::write(
        &map_path,
        format!(
            r#"{{ "{}": {{ "diagnostics": "{}" }} }}"#,
            source.display(),
            stale.display()
        ),
    )
    .unwrap();

    let mut cli = cli_for(&[source.to_str().unwrap()]);
    cli.compile_only = true;
    cli.serialize_diagnostics = true;
    cli.output_file_map = Some(map_path);
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    let (_, job) = compilation.jobs().iter().next().unwrap();
    assert_eq!(
        job.output.auxiliary(FileType::Diagnostics),
        Some(stale.as_path())
    );
    // A missing file now reliably means "this run did not happen".
    assert!(!stale.exists());
}

//! Action-graph shape: what the driver plans for each mode and output
//! request, before any job runs.

use kemudi::driver::Driver;
use kemudi::test_utils::{cli_for, count_jobs};

#[test]
fn test_standard_mode_builds_one_compile_per_input() {
    let _ = env_logger::try_init();
    let mut cli = cli_for(&["a.km", "b.km", "c.km"]);
    cli.compile_only = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "compile"), 3);
    assert_eq!(count_jobs(&compilation, "merge-module"), 0);
    assert_eq!(count_jobs(&compilation, "link"), 0);
    assert_eq!(count_jobs(&compilation, "generate-debug-symbols"), 0);
    assert_eq!(compilation.top_jobs().jobs.len(), 3);
}

#[test]
fn test_linking_adds_one_link_job() {
    let cli = cli_for(&["a.km", "b.km"]);
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "compile"), 2);
    assert_eq!(count_jobs(&compilation, "link"), 1);
    assert_eq!(count_jobs(&compilation, "merge-module"), 0);
    // The link job is the only top-level job.
    assert_eq!(compilation.top_jobs().jobs.len(), 1);
}

#[test]
fn test_module_generation_inserts_an_independent_merge() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_executable = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "compile"), 2);
    assert_eq!(count_jobs(&compilation, "merge-module"), 1);
    assert_eq!(count_jobs(&compilation, "link"), 1);
    // Without debug info the merge is its own top-level job, not a link
    // input; top level is [merge, link].
    assert_eq!(compilation.top_jobs().jobs.len(), 2);
    let link = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .map(|(id, _)| id)
        .unwrap();
    let merge = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .map(|(id, _)| id)
        .unwrap();
    assert!(!compilation.jobs()[link].inputs.jobs.contains(&merge));
}

#[test]
fn test_debug_info_shares_the_merge_with_the_link() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.emit_module = true;
    cli.emit_executable = true;
    cli.debug_info = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "compile"), 2);
    assert_eq!(count_jobs(&compilation, "merge-module"), 1);
    assert_eq!(count_jobs(&compilation, "link"), 1);
    assert_eq!(count_jobs(&compilation, "generate-debug-symbols"), 1);
    // Top level is [link, debug-symbols]; the merge feeds the link so the
    // module timestamp reaches the debug-info step.
    assert_eq!(compilation.top_jobs().jobs.len(), 2);
    let link = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .map(|(id, _)| id)
        .unwrap();
    let merge = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "merge-module")
        .map(|(id, _)| id)
        .unwrap();
    assert!(compilation.jobs()[link].inputs.jobs.contains(&merge));

    insta::assert_snapshot!(compilation.actions().dump(), @r###"
    0: input, "a.km", source
    1: compile, {0}, object
    2: input, "b.km", source
    3: compile, {2}, object
    4: merge-module, [1, 3], module
    5: link, {1, 3, 4}, image
    6: generate-debug-symbols, [5], debug-info
    "###);
}

#[test]
fn test_repl_mode_rejects_inputs() {
    let mut cli = cli_for(&["a.km"]);
    cli.repl = true;
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver.diagnostics().has_errors());
    assert!(driver
        .diagnostics()
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("REPL")));
}

#[test]
fn test_repl_mode_without_inputs_builds_one_job() {
    let mut cli = cli_for(&[]);
    cli.repl = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();
    assert_eq!(count_jobs(&compilation, "repl"), 1);
    assert_eq!(compilation.jobs().len(), 1);
    let (_, job) = compilation.jobs().iter().next().unwrap();
    assert!(job.arguments.contains(&"--repl".to_string()));
    // Nothing lands on disk for a REPL.
    assert!(job.output.primary().is_none());
}

#[test]
fn test_zero_inputs_is_a_configuration_error() {
    let cli = cli_for(&[]);
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver.diagnostics().has_errors());
}

#[test]
fn test_unrecognized_input_is_reported_and_skipped() {
    let mut cli = cli_for(&["a.xyz", "b.km"]);
    cli.compile_only = true;
    let mut driver = Driver::new(cli);
    // Construction fails closed even though the second input was fine.
    assert!(driver.build_compilation().is_err());
    let messages: Vec<&str> = driver
        .diagnostics()
        .diagnostics()
        .iter()
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("xyz"));
}

#[test]
fn test_object_inputs_alone_fail_closed() {
    let cli = cli_for(&["a.o", "b.o"]);
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver.diagnostics().has_errors());
}

#[test]
fn test_object_input_joins_the_link() {
    let cli = cli_for(&["main.km", "extra.o"]);
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();

    assert_eq!(count_jobs(&compilation, "compile"), 1);
    assert_eq!(count_jobs(&compilation, "link"), 1);
    let (_, link) = compilation
        .jobs()
        .iter()
        .find(|(_, job)| compilation.actions()[job.source].kind.name() == "link")
        .unwrap();
    assert!(link.arguments.iter().any(|a| a == "extra.o"));
}

#[test]
fn test_object_input_without_linking_is_an_error() {
    let mut cli = cli_for(&["a.km", "extra.o"]);
    cli.compile_only = true;
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver
        .diagnostics()
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("linking")));
}

#[test]
fn test_whole_module_mode_builds_a_single_compile() {
    let mut cli = cli_for(&["a.km", "b.km", "c.km"]);
    cli.whole_module = true;
    cli.compile_only = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();
    assert_eq!(count_jobs(&compilation, "compile"), 1);
    let (_, job) = compilation.jobs().iter().next().unwrap();
    for source in ["a.km", "b.km", "c.km"] {
        assert!(job.arguments.iter().any(|a| a == source));
    }
}

#[test]
fn test_immediate_mode_has_no_on_disk_output() {
    let mut cli = cli_for(&["script.km"]);
    cli.interpret = true;
    let mut driver = Driver::new(cli);
    let compilation = driver.build_compilation().unwrap();
    assert_eq!(compilation.jobs().len(), 1);
    let (_, job) = compilation.jobs().iter().next().unwrap();
    assert!(job.output.primary().is_none());
    assert!(job.arguments.contains(&"-i".to_string()));
    assert!(compilation.temp_files().is_empty());
}

#[test]
fn test_single_output_with_multiple_producers_is_an_error() {
    let mut cli = cli_for(&["a.km", "b.km"]);
    cli.compile_only = true;
    cli.output_file = Some("combined.o".into());
    let mut driver = Driver::new(cli);
    assert!(driver.build_compilation().is_err());
    assert!(driver
        .diagnostics()
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("-o")));
}

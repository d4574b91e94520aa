//! Integration tests for the job runner: context per configuration,
//! custom-data layering, template rendering and file export.

mod common;

use std::sync::Arc;

use common::{ScriptedApi, api_error, engine};
use indexmap::IndexMap;
use reportflow_pipeline::{Job, JobRunner, PipelineError, RunOptions, load_jobs};
use serde_json::{Value, json};

fn runner(api: &Arc<ScriptedApi>, base_dir: &std::path::Path) -> JobRunner {
    JobRunner::new(engine(api), base_dir)
        .with_global_custom_data(
            json!({"timezoneOverride": "UTC", "label": "global", "owner": "ops"})
                .as_object()
                .unwrap()
                .clone(),
        )
        .with_options(RunOptions {
            show_output: true,
            args: json!({"jobs": ["report"]}),
        })
}

fn load(jobs: Value) -> IndexMap<String, Job> {
    load_jobs(jobs.as_object().unwrap()).unwrap()
}

#[tokio::test]
async fn test_job_renders_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let api = ScriptedApi::new();
    api.ok("list_queues", json!({"entities": [{"name": "Sales"}, {"name": "Support"}], "pageCount": 1}));

    let jobs = load(json!({
        "report": {
            "customData": {"label": "job"},
            "configurations": {
                "queues": {
                    "customData": {"label": "configuration"},
                    "executionPlan": {
                        "queues": {"type": "GetQueues", "strategy": "single"}
                    },
                    "templates": {
                        "list": {
                            "template": "{% for q in data.queues.entities %}{{ q.name }}\n{% endfor %}{{ vars.label }} {{ vars.owner }} {{ vars.args.jobs.0 }}",
                            "fileName": "{{ vars.label }}.txt"
                        }
                    },
                    "exports": {
                        "disk": {
                            "type": "file",
                            "destination": "{{ vars.outDir }}/nested",
                            "customData": {"label": "export", "outDir": out.to_string_lossy()}
                        }
                    }
                }
            }
        }
    }));

    let report = runner(&api, dir.path()).run_job(&jobs["report"]).await.unwrap();
    assert_eq!(report.job, "report");
    assert_eq!(report.configurations.len(), 1);
    let document = &report.configurations[0].documents[0];
    assert_eq!(document.file_name, "export.txt");
    assert_eq!(report.configurations[0].export_failures(), 0);

    let written = std::fs::read_to_string(out.join("nested/export.txt")).unwrap();
    assert_eq!(written, "Sales\nSupport\nexport ops report");
}

#[tokio::test]
async fn test_template_file_relative_to_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();
    std::fs::write(dir.path().join("templates/summary.tera"), "interval={{ vars.interval }}").unwrap();
    let out = dir.path().join("reports");
    let api = ScriptedApi::new();

    let jobs = load(json!({
        "summary": {
            "configurations": {
                "only": {
                    "customData": {"interval": "PT1H"},
                    "templates": {"s": {"templateFile": "templates/summary.tera", "fileName": "s.txt"}},
                    "exports": {"disk": {"type": "File", "destination": out.to_string_lossy()}}
                }
            }
        }
    }));

    runner(&api, dir.path()).run_job(&jobs["summary"]).await.unwrap();
    assert_eq!(std::fs::read_to_string(out.join("s.txt")).unwrap(), "interval=PT1H");
}

#[tokio::test]
async fn test_failed_configuration_stops_job() {
    let dir = tempfile::tempdir().unwrap();
    let api = ScriptedApi::new();
    api.respond("list_queues", Err(api_error(403, None)));

    let jobs = load(json!({
        "report": {
            "configurations": {
                "first": {"executionPlan": {"q": {"type": "GetQueues", "strategy": "single"}}},
                "second": {"executionPlan": {"u": {"type": "GetUsers", "strategy": "single"}}}
            }
        }
    }));

    let err = runner(&api, dir.path()).run_job(&jobs["report"]).await.unwrap_err();
    assert_eq!(err.remote_error().and_then(|e| e.status()), Some(403));
    assert!(api.calls_to("list_users").is_empty());
}

#[tokio::test]
async fn test_context_rebuilt_per_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let api = ScriptedApi::new();

    let jobs = load(json!({
        "report": {
            "configurations": {
                "first": {
                    "executionPlan": {"mark": {"type": "transform", "expressions": [
                        "{{ assign(path=\"data.marker\", value=1) }}{{ assign(path=\"vars.leak\", value=true) }}"
                    ]}},
                    "templates": {"t": {"template": "{{ data | length }}", "fileName": "first.txt"}},
                    "exports": {"disk": {"type": "file", "destination": out.to_string_lossy()}}
                },
                "second": {
                    "templates": {"t": {
                        "template": "{{ data | length }} {% if vars.leak %}leaked{% else %}clean{% endif %}",
                        "fileName": "second.txt"
                    }},
                    "exports": {"disk": {"type": "file", "destination": out.to_string_lossy()}}
                }
            }
        }
    }));

    runner(&api, dir.path()).run_job(&jobs["report"]).await.unwrap();
    assert_eq!(std::fs::read_to_string(out.join("first.txt")).unwrap(), "1");
    assert_eq!(std::fs::read_to_string(out.join("second.txt")).unwrap(), "0 clean");
}

#[tokio::test]
async fn test_export_failure_is_logged_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let good = dir.path().join("good");
    let api = ScriptedApi::new();

    let jobs = load(json!({
        "report": {
            "configurations": {
                "only": {
                    "templates": {"t": {"template": "x", "fileName": "x.txt"}},
                    "exports": {
                        "bad": {"type": "file", "destination": blocker.to_string_lossy()},
                        "good": {"type": "file", "destination": good.to_string_lossy()}
                    }
                }
            }
        }
    }));

    let report = runner(&api, dir.path()).run_job(&jobs["report"]).await.unwrap();
    let document = &report.configurations[0].documents[0];
    assert_eq!(document.failed_exports, vec!["bad".to_string()]);
    assert_eq!(document.written, vec![good.join("x.txt")]);
}

#[tokio::test]
async fn test_run_jobs_skips_unknown_and_continues_after_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let api = ScriptedApi::new();
    api.respond("list_queues", Err(api_error(500, None)));

    let jobs = load(json!({
        "broken": {"configurations": {"c": {"executionPlan": {"q": {"type": "GetQueues", "strategy": "single"}}}}},
        "fine": {"configurations": {"c": {
            "templates": {"t": {"template": "ok", "fileName": "fine.txt"}},
            "exports": {"disk": {"type": "file", "destination": out.to_string_lossy()}}
        }}}
    }));

    let names = vec!["broken".to_string(), "missing".to_string(), "fine".to_string()];
    let summary = runner(&api, dir.path()).run_jobs(&jobs, &names).await;

    assert!(!summary.is_success());
    assert_eq!(summary.unknown, vec!["missing".to_string()]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "broken");
    assert_eq!(summary.completed.len(), 1);
    assert!(out.join("fine.txt").exists());
}

#[tokio::test]
async fn test_invalid_interval_fails_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let api = ScriptedApi::new();
    let jobs = load(json!({
        "report": {"configurations": {"c": {"customData": {"interval": "soon"}}}}
    }));

    let err = runner(&api, dir.path()).run_job(&jobs["report"]).await.unwrap_err();
    assert!(!matches!(err, PipelineError::Request { .. }));
    assert!(api.calls().is_empty());
}

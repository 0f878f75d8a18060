//! 실제 code-server 스택 대상 종단 테스트
//!
//! Terraform, AWS CLI, 자격 증명이 필요하므로 기본적으로 무시됩니다.
//!
//! ```text
//! INFRAPROBE_TF_DIR=../terraform cargo test -p infraprobe-workflow \
//!     --test code_server -- --ignored --nocapture
//! ```

use std::sync::Arc;
use std::time::Duration;

use infraprobe_workflow::{
    AwsCli, ReadinessPolicy, TerraformBackend, Verifier, WorkflowError, WorkflowOptions,
    WorkflowRunnerBuilder,
};

const REGION: &str = "us-west-2";
const PASSWORD_PATH: &str = "/code-server/password";

#[tokio::test]
#[ignore = "provisions real AWS infrastructure"]
async fn code_server_stack_is_reachable_and_cleaned_up() {
    let dir = std::env::var("INFRAPROBE_TF_DIR").unwrap_or_else(|_| "../".to_owned());
    let aws = Arc::new(AwsCli::new());
    let runner = WorkflowRunnerBuilder::new()
        .provisioner(Arc::new(TerraformBackend::new()))
        .resource_query(Arc::clone(&aws))
        .secret_store(Arc::clone(&aws))
        .readiness_policy(ReadinessPolicy {
            ceiling: Duration::from_secs(300),
            poll_interval: Duration::from_secs(15),
        })
        .build()
        .unwrap();

    let config = runner
        .configure(WorkflowOptions::new(dir, REGION))
        .unwrap();

    let report = runner
        .run(config, |ctx| async move {
            let mut v = Verifier::new();
            for name in [
                "vscode_server_instance_id",
                "vscode_server_public_ip",
                "vscode_server_cloudfront_domain_name",
            ] {
                let value = ctx.output(name).await?;
                v.non_empty(format!("output.{name}"), &value);
            }
            let ssm_path = ctx.output("vscode_server_password_ssm").await?;
            v.equals("output.vscode_server_password_ssm", PASSWORD_PATH, &ssm_path);

            let ids = ctx.verify_resource_tag("Name", "VSCodeServer").await?;
            v.non_empty_list("tag.Name=VSCodeServer", &ids);

            ctx.await_ready(&ids).await;

            let password = ctx.secret(PASSWORD_PATH).await?;
            v.secret_present("secret.code-server-password", &password);

            Ok::<_, WorkflowError>(v.finish())
        })
        .await;

    for result in &report.verification.results {
        println!("{result}");
    }
    let report = report.into_result().unwrap();
    assert!(report.verification.is_success());

    let remaining = runner
        .verify_resource_tag(REGION, "Name", "VSCodeServer")
        .await
        .unwrap();
    assert!(remaining.is_empty(), "instances left after destroy: {remaining:?}");
}

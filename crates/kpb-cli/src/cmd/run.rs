use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use kpb_core::engine::Engine;
use kpb_core::event::{EventSink, EVENT_CHANNEL_CAPACITY};
use kpb_core::manifest::{self, KubectlApplier, KustomizeBuilder, KUBECTL, KUSTOMIZE};
use kpb_core::playbook::{Manifest, Playbook};
use kpb_core::run::{self as loader, LoadedRun};
use kpb_kube::KubeAccess;

use crate::kubeconfig;
use crate::output::{self, Format};

pub struct Options {
    pub directory: PathBuf,
    pub kubeconfig: Option<PathBuf>,
    pub context: Option<String>,
    pub envfile: Option<PathBuf>,
    pub known_node: Option<String>,
    pub dry_run: bool,
    pub format: Format,
}

pub fn run(options: Options) -> Result<()> {
    // Everything local is checked before the cluster is contacted.
    let loaded = LoadedRun::load(&options.directory, options.envfile.as_deref())?;

    if options.dry_run {
        return print_rendered(&loaded.playbook, options.format);
    }

    let tools = Tools {
        kustomize: manifest::require_tool(KUSTOMIZE)?,
        kubectl: manifest::require_tool(KUBECTL)?,
    };
    let kubeconfig = kubeconfig::resolve(options.kubeconfig.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute(options, loaded, tools, kubeconfig))
}

struct Tools {
    kustomize: PathBuf,
    kubectl: PathBuf,
}

async fn execute(
    options: Options,
    loaded: LoadedRun,
    tools: Tools,
    kubeconfig: PathBuf,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping run");
                cancel.cancel();
            }
        })
    };

    let result = rollout(&options, &loaded, &tools, &kubeconfig, &cancel).await;
    interrupt.abort();
    result
}

async fn rollout(
    options: &Options,
    loaded: &LoadedRun,
    tools: &Tools,
    kubeconfig: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let client = kpb_kube::connect(kubeconfig, options.context.as_deref()).await?;
    let access = KubeAccess::new(client);

    if let Some(node) = &options.known_node {
        loader::check_known_node(&access, node, cancel).await?;
    }
    loaded.check_prerequisites(&access, cancel).await?;

    let builder = KustomizeBuilder::new(&tools.kustomize, &loaded.directory);
    let applier = KubectlApplier::new(&tools.kubectl)
        .kubeconfig(kubeconfig)
        .context(options.context.clone());

    let (sink, rx) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
    let presenter = tokio::spawn(output::present(rx, options.format));

    // The engine owns the sink; dropping it ends the presenter.
    let result = Engine::new(&access, &builder, &applier)
        .with_events(sink)
        .with_cancel(cancel.clone())
        .run(&loaded.playbook)
        .await;
    presenter.await?;

    output::print_summary(&result?, options.format)
}

#[derive(Serialize)]
struct Rendered<'a> {
    component: &'a str,
    kustomization: &'a Manifest,
}

fn print_rendered(playbook: &Playbook, format: Format) -> Result<()> {
    for component in &playbook.components {
        match format {
            Format::Json => output::print_json(&Rendered {
                component: &component.name,
                kustomization: &component.manifest,
            })?,
            Format::Text => {
                println!("---");
                println!("# {}", component.name);
                print!("{}", serde_yaml::to_string(&component.manifest)?);
            }
        }
    }
    Ok(())
}

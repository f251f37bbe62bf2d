use volscope_core::{Snapshot, VolumeUsageRecord};

const COLLECT_SUCCESS: &str = "volscope_collect_success";
const COLLECT_SUCCESS_HELP: &str = "Whether the last collection succeeded";

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn volume_labels(record: &VolumeUsageRecord) -> String {
    format!(
        "namespace=\"{}\",claim=\"{}\",node=\"{}\",pod=\"{}\",volume_id=\"{}\",region=\"{}\"",
        escape_label(&record.namespace),
        escape_label(&record.name),
        escape_label(&record.node),
        escape_label(&record.pod),
        escape_label(&record.volume_id),
        escape_label(&record.region),
    )
}

fn push_volume_gauge<F>(
    output: &mut String,
    name: &str,
    help: &str,
    records: &[VolumeUsageRecord],
    value: F,
) where
    F: Fn(&VolumeUsageRecord) -> f64,
{
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} gauge\n", name));
    for record in records {
        output.push_str(&format!("{}{{{}}} {}\n", name, volume_labels(record), value(record)));
    }
    output.push('\n');
}

fn push_gauge(output: &mut String, name: &str, help: &str, value: f64) {
    output.push_str(&format!("# HELP {} {}\n", name, help));
    output.push_str(&format!("# TYPE {} gauge\n", name));
    output.push_str(&format!("{} {}\n\n", name, value));
}

/// Renders a collection in Prometheus text exposition format.
///
/// `None` means the collection failed; only the success gauge is emitted.
pub fn render_prometheus(snapshot: Option<&Snapshot>) -> String {
    let mut output = String::new();

    let Some(snapshot) = snapshot else {
        push_gauge(&mut output, COLLECT_SUCCESS, COLLECT_SUCCESS_HELP, 0.0);
        return output;
    };

    push_gauge(&mut output, COLLECT_SUCCESS, COLLECT_SUCCESS_HELP, 1.0);
    push_gauge(
        &mut output,
        "volscope_nodes_listed",
        "Nodes returned by the directory",
        snapshot.stats.nodes_listed as f64,
    );
    push_gauge(
        &mut output,
        "volscope_nodes_unreachable",
        "Nodes whose summary could not be fetched",
        snapshot.stats.nodes_unreachable as f64,
    );
    push_gauge(
        &mut output,
        "volscope_nodes_undecodable",
        "Nodes whose summary could not be decoded",
        snapshot.stats.nodes_undecodable as f64,
    );
    push_gauge(
        &mut output,
        "volscope_volumes_unresolved",
        "Volumes whose claim could not be resolved to a device",
        snapshot.stats.volumes_unresolved as f64,
    );

    push_volume_gauge(
        &mut output,
        "volscope_volume_used_bytes",
        "Bytes used on the volume",
        &snapshot.records,
        |r| r.used_bytes as f64,
    );
    push_volume_gauge(
        &mut output,
        "volscope_volume_capacity_bytes",
        "Bytes provisioned for the volume",
        &snapshot.records,
        |r| r.capacity_bytes as f64,
    );
    push_volume_gauge(
        &mut output,
        "volscope_volume_usage_percent",
        "Used share of provisioned capacity",
        &snapshot.records,
        |r| r.percent,
    );

    output
}

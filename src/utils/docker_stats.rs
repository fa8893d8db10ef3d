use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerUsage {
    pub id: String,
    pub image: String,
    pub status: String,
    pub name: String,
    pub memory_str: String,
    pub memory_bytes: u64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerUsage {
    pub containers: Vec<ContainerUsage>,
    pub total_mem: u64,
}

/// Parses docker's human-readable memory strings ("12.5MiB") to bytes.
pub fn parse_memory(mem_str: &str) -> u64 {
    let mem_str = mem_str.trim();
    let split = mem_str
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(mem_str.len());
    let (value, unit) = mem_str.split_at(split);
    let Ok(value) = value.parse::<f64>() else {
        return 0;
    };
    let factor: f64 = match unit {
        "B" | "b" | "" => 1.0,
        "kB" | "KB" => 1000.0,
        "KiB" => 1024.0,
        "mB" | "MB" => 1000.0 * 1000.0,
        "MiB" => 1024.0 * 1024.0,
        "gB" | "GB" => 1000.0 * 1000.0 * 1000.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (value * factor) as u64
}

async fn docker_output(args: &[&str]) -> Option<String> {
    let output = Command::new("docker").args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Lists running containers with their memory usage.
///
/// Any failure to query docker (not installed, daemon down) yields an empty
/// result rather than an error; the resource snapshot must never fail on a
/// missing container runtime.
pub async fn container_usage() -> DockerUsage {
    let Some(ps_out) = docker_output(&["ps", "--format", "{{.ID}}|{{.Image}}|{{.Status}}|{{.Names}}"]).await
    else {
        debug!("docker ps unavailable, reporting no containers");
        return DockerUsage::default();
    };

    let mut containers: Vec<ContainerUsage> = ps_out
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.split('|');
            Some(ContainerUsage {
                id: parts.next()?.to_string(),
                image: parts.next()?.to_string(),
                status: parts.next()?.to_string(),
                name: parts.next()?.to_string(),
                memory_str: "0B".to_string(),
                memory_bytes: 0,
            })
        })
        .collect();

    if containers.is_empty() {
        return DockerUsage::default();
    }

    let mut total_mem = 0u64;
    if let Some(stats_out) =
        docker_output(&["stats", "--no-stream", "--format", "{{.ID}}|{{.MemUsage}}"]).await
    {
        for line in stats_out.lines() {
            let mut parts = line.split('|');
            let (Some(id), Some(usage)) = (parts.next(), parts.next()) else {
                continue;
            };
            // "12.5MiB / 1.95GiB" -> take "12.5MiB"
            let usage_str = usage.split('/').next().unwrap_or("0B").trim().to_string();
            if let Some(container) = containers.iter_mut().find(|c| c.id == id) {
                container.memory_bytes = parse_memory(&usage_str);
                container.memory_str = usage_str;
                total_mem += container.memory_bytes;
            }
        }
    }

    DockerUsage {
        containers,
        total_mem,
    }
}

/// Stops a container and removes it so its ports are freed.
pub async fn stop_container(id: &str) -> Result<(), String> {
    let output = Command::new("docker")
        .args(["stop", id])
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }
    // Removal failure usually means the container is already gone.
    let _ = Command::new("docker").args(["rm", id]).output().await;
    Ok(())
}

/// Stops every running container. An empty container list is a success.
pub async fn stop_all_containers() -> Result<String, String> {
    let Some(ids_out) = docker_output(&["ps", "-q"]).await else {
        return Err("docker unavailable".to_string());
    };
    let ids: Vec<&str> = ids_out.lines().filter(|l| !l.trim().is_empty()).collect();
    if ids.is_empty() {
        return Ok("No containers to stop".to_string());
    }
    let output = Command::new("docker")
        .arg("stop")
        .args(&ids)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).into_owned());
    }
    Ok(format!("Stopped {} containers", ids.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binary_and_decimal_units() {
        assert_eq!(parse_memory("512B"), 512);
        assert_eq!(parse_memory("1KiB"), 1024);
        assert_eq!(parse_memory("1kB"), 1000);
        assert_eq!(parse_memory("12.5MiB"), (12.5 * 1024.0 * 1024.0) as u64);
        assert_eq!(parse_memory("2GiB"), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn garbage_parses_to_zero() {
        assert_eq!(parse_memory("n/a"), 0);
        assert_eq!(parse_memory(""), 0);
    }
}

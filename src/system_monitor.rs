use std::path::PathBuf;
use std::time::Duration;

use metrics::gauge;
use sysinfo::{Disks, System};
use tokio::time;

/// Periodically samples host health plus two judge-specific signals: free
/// space on the disk holding the workspace root, and how many workspace
/// directories are currently on disk. A residual workspace after all
/// requests drain means a cleanup bug.
pub async fn start_system_monitor(workspace_root: PathBuf) {
    tokio::spawn(async move {
        let mut system = System::new_all();
        let mut disks = Disks::new_with_refreshed_list();
        let mut interval = time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;

            system.refresh_memory();
            system.refresh_cpu_all();
            disks.refresh(true);

            gauge!("system_memory_used_bytes").set(system.used_memory() as f64);
            gauge!("system_cpu_usage_percent").set(system.global_cpu_usage() as f64);

            // longest mount-point prefix owns the workspace root
            let free = disks
                .iter()
                .filter(|disk| workspace_root.starts_with(disk.mount_point()))
                .max_by_key(|disk| disk.mount_point().as_os_str().len())
                .map(|disk| disk.available_space())
                .unwrap_or(0);
            gauge!("workspace_disk_free_bytes").set(free as f64);

            let live = std::fs::read_dir(&workspace_root)
                .map(|entries| entries.count())
                .unwrap_or(0);
            gauge!("workspaces_active").set(live as f64);
        }
    });
}

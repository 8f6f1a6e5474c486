use chrono::NaiveDate;
use kpi_dashboard::*;
use std::error::Error;

fn report_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 12).unwrap_or_default()
}

fn print_table(table: &PivotTable, config: &DashboardConfig, last_day: usize) {
    println!("\n📋 {}", table.kpi_type.title());
    for line in table.render(config) {
        // Label, the first days of the month and the Total column.
        let mut shown: Vec<&str> = line.iter().take(last_day + 1).map(String::as_str).collect();
        if let Some(total) = line.last() {
            shown.push(total);
        }
        println!("  {:<22} {}", shown[0], shown[1..].join(" | "));
    }
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("📊 Monthly KPI Report Demo\n");

    let mut dashboard = Dashboard::new(MemoryStore::new(), DashboardConfig::default())
        .with_clock(report_date);
    let config = dashboard.config().clone();

    let north = registry::create_cost_center(
        dashboard.store_mut(),
        &config,
        &CreateCostCenter {
            name: "Operação Norte".to_string(),
            status: RecordStatus::Active,
        },
    )?;

    let mut clients = Vec::new();
    for (name, key_account, revenue_budget) in [
        ("Transportes Andrade", false, 45_000.0),
        ("Frigorífico Serra", false, 30_000.0),
        ("Mercado Central", true, 90_000.0),
    ] {
        let mut input = CreateClient::named(name);
        input.cost_center_id = (!key_account).then_some(north.id);
        input.is_key_account = key_account;
        input.budget = BudgetTargets {
            revenue: Some(revenue_budget),
            on_time: Some(95.0),
            occupancy: Some(85.0),
            availability: Some(92.0),
        };
        clients.push(registry::create_client(dashboard.store_mut(), &config, &input)?);
    }
    println!("✅ Registered {} clients in '{}'", clients.len(), north.name);

    for (month, last_day) in [(5, 31), (6, 12)] {
        for day in 1..=last_day {
            let entries = clients
                .iter()
                .enumerate()
                .map(|(idx, client)| {
                    let wave = f64::from((day * 7 + idx as u32 * 3) % 10);
                    KpiFormEntry::new(client.id)
                        .with(KpiType::Revenue, 1_000.0 * (idx as f64 + 1.0) + 85.0 * wave)
                        .with(KpiType::OnTime, 88.0 + wave)
                        .with(KpiType::Occupancy, 78.0 + wave * 1.5)
                        .with(KpiType::ThirdParty, 5.0 + wave)
                })
                .collect();

            upsert_daily_snapshot(
                dashboard.store_mut(),
                &config,
                &UpsertDailySnapshot {
                    date: format!("2025-{:02}-{:02}", month, day),
                    entries,
                },
            )?;
        }
    }
    println!("✅ Loaded daily snapshots for May and June 2025");

    let summary = compute_dashboard_summary(
        dashboard.store(),
        &DashboardSummaryQuery {
            date: report_date().format("%Y-%m-%d").to_string(),
            ..Default::default()
        },
    )?;

    println!(
        "\n📈 Month to date (day {}/{}):",
        summary.day_of_month, summary.days_in_month
    );
    println!(
        "  {:<16} real {:>16}  bgt {:>16}  pm {:>16}",
        KpiType::Revenue.title(),
        format_brl(summary.revenue.actual),
        format_brl(summary.revenue.budget),
        format_brl(summary.revenue.prior_month)
    );
    for kpi_type in [
        KpiType::OnTime,
        KpiType::Occupancy,
        KpiType::ThirdParty,
        KpiType::Availability,
    ] {
        let metric = summary.metric(kpi_type);
        println!(
            "  {:<16} real {:>16}  bgt {:>16}  pm {:>16}",
            kpi_type.title(),
            format_percent(metric.actual),
            format_percent(metric.budget),
            format_percent(metric.prior_month)
        );
    }

    let pivot = build_monthly_pivot(
        dashboard.store(),
        &config,
        &MonthQuery {
            month: "2025-06".to_string(),
            client_id: None,
        },
        dashboard.today(),
    )?;
    for kpi_type in [KpiType::Revenue, KpiType::OnTime] {
        if let Some(table) = pivot.table(kpi_type) {
            print_table(table, &config, 5);
        }
    }

    let response = dashboard.handle_json(
        r#"{"procedure": "listClients", "input": {"search": "mercado"}}"#,
    );
    println!("\n🔎 listClients response: {}", response);

    Ok(())
}

use chrono::{Duration, TimeZone, Utc};
use engdb::retrieval::MockEngdbService;
use engdb::{get_mnemonic, Descriptor, Encoding, Samples};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("EngDB - Basic Usage Example");
    println!("===========================");

    let start = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();

    // Two days of once-a-minute voltages plus a heater that switches every few hours
    let mut service = MockEngdbService::new();
    let minutes: Vec<_> = (0..2 * 24 * 60).map(|m| start + Duration::minutes(m)).collect();
    let volts: Vec<f64> = (0..minutes.len())
        .map(|i| 4.0 + (i as f64 / 180.0).sin() * 0.2 + rand::random::<f64>() * 0.05)
        .collect();
    service.insert(
        "IMIR_HK_ICE_SEC_VOLT4",
        Encoding::AllPoints,
        Samples::numeric(minutes, volts)?,
        Some(Descriptor {
            tlm_mnemonic: "IMIR_HK_ICE_SEC_VOLT4".to_string(),
            description: "ICE secondary voltage 4".to_string(),
            unit: Some("V".to_string()),
            ..Default::default()
        }),
    );

    let switches: Vec<_> = (-1..16).map(|h| start + Duration::hours(h * 3)).collect();
    let states: Vec<f64> = (0..switches.len()).map(|i| (i % 2) as f64).collect();
    service.insert(
        "IMIR_HK_HEATER_ON",
        Encoding::ChangeOnly,
        Samples::numeric(switches, states)?,
        None,
    );

    let end = start + Duration::days(2);

    println!("\n1. Retrieving all-points telemetry...");
    let mut volts = get_mnemonic(&service, "IMIR_HK_ICE_SEC_VOLT4", start, end).await?;
    println!("   {}", volts);
    println!("   unit: {}", volts.display_unit());

    println!("\n2. Daily statistics...");
    volts.daily_stats(3.0)?;
    for i in 0..volts.stats().len() {
        println!(
            "   {}  mean {}  stdev {:.4}",
            volts.stats().median_times[i],
            volts.stats().mean[i],
            volts.stats().stdev[i]
        );
    }

    println!("\n3. Retrieving change-only telemetry...");
    let heater = get_mnemonic(&service, "IMIR_HK_HEATER_ON", start, end).await?;
    println!("   {}", heater);

    println!("\n4. Power only while the heater is on...");
    let gated = (&volts * &heater)?;
    println!("   {}", gated);

    println!("\n5. Six-hour statistics of the gated series...");
    let mut gated = gated;
    gated.timed_stats(Duration::hours(6), 3.0)?;
    println!("   {} windows", gated.stats().len());

    println!("\nExample completed successfully!");
    Ok(())
}

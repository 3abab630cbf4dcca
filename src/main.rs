use strike_locator::utils::logging;
use strike_locator::{
    DetectionEvent, Event, LocatorConfig, NanosecondTimestamp, OutputFormat, Point, SignalVelocity,
    StrikeFormatter, StrikeLocator,
};

/// Station network of the demo, numbered from 1
const DEMO_STATIONS: [(f64, f64); 6] = [
    (11.0, 49.0),
    (12.0, 49.0),
    (11.0, 50.0),
    (12.0, 50.0),
    (10.4, 48.4),
    (12.7, 48.8),
];

fn demo_events(origin: Point, origin_time: NanosecondTimestamp) -> Result<Vec<DetectionEvent>, Box<dyn std::error::Error>> {
    let velocity = SignalVelocity::default();
    let mut events = Vec::with_capacity(DEMO_STATIONS.len());
    for (number, (x, y)) in DEMO_STATIONS.iter().enumerate() {
        let station = Point::new(*x, *y);
        let delay = velocity.get_distance_time(origin.distance_to(&station)).round() as i64;
        let arrival = origin_time
            .checked_add_ns(delay)
            .ok_or("arrival time out of range")?;
        events.push(DetectionEvent::new(station, arrival)?.with_station(number as u32 + 1));
    }
    Ok(events)
}

fn run_demo(locator: &StrikeLocator) -> Result<(), Box<dyn std::error::Error>> {
    let origin = Point::new(11.47, 49.28);
    let origin_time: NanosecondTimestamp = "2011-08-14 18:31:07.123456789".parse()?;
    let events = demo_events(origin, origin_time)?;

    println!("Stroke at {} {}", origin_time, origin);
    for event in &events {
        println!("  station {:>2}: {}", event.station().unwrap_or_default(), event);
    }

    let strike = locator.locate(&events)?;
    println!("Located:   {}", strike);
    println!(
        "Error:     {:.2} m, {} ns",
        strike.location.distance_to(&origin),
        origin_time.ns_difference_to(strike.timestamp())
    );
    println!("{}", StrikeFormatter::pretty_json().format(&strike)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("strike-locator", |s| s.as_str());
    logging::init(std::env::var_os("STRIKE_LOCATOR_VERBOSE").is_some());

    if args.len() == 2 && args[1] == "--demo" {
        return run_demo(&StrikeLocator::new(LocatorConfig::default())?);
    }

    if args.len() != 2 && args.len() != 3 {
        eprintln!("Usage: {} <events.json> [config.json]", program);
        eprintln!("   or: {} --demo", program);
        return Err("Invalid arguments".into());
    }

    let config = match args.get(2) {
        Some(path) => LocatorConfig::from_file(path)?,
        None => LocatorConfig::default(),
    };
    let locator = StrikeLocator::new(config)?;

    let json_data = std::fs::read_to_string(&args[1])?;
    let events: Vec<DetectionEvent> = serde_json::from_str(&json_data)?;

    let strike = locator.locate(&events)?;
    println!("{}", StrikeFormatter::new(OutputFormat::Text).format(&strike)?);
    if !strike.refined {
        eprintln!("warning: least-squares fit degenerated, three point candidate reported");
    }
    Ok(())
}

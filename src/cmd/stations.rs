use radrec::stations::STATIONS;

pub fn cmd_stations() {
    for station in STATIONS {
        println!("{:<6} {}", station.id, station.name);
    }
}

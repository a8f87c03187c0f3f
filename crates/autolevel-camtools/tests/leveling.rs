use autolevel_camtools::{
    BicubicSurface, LevelingOptions, ProbeGridGenerator, Surface, ToolpathLeveler, DEFAULT_MARKER,
};
use autolevel_core::{Error, HeightMap, ToolpathError};
use std::fs;

fn probed_map() -> HeightMap {
    let plan = ProbeGridGenerator::plan(30.0, 30.0, -10.0, 10.0).unwrap();
    let mut map = HeightMap::new();
    for (index, point) in plan.points().iter().enumerate() {
        map.insert(index, *point, 0.001 * point.x - 0.002 * point.y);
    }
    map
}

const PROGRAM: &str = "G21\nG90\nG0 X-5 Y5\nG1 Z-1 F60\nG1 X-25 Y5 F200\nG1 X-25 Y25\nG0 Z2\nM30\n";

#[test]
fn test_level_file_writes_marked_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.nc");
    fs::write(&input, PROGRAM).unwrap();

    let surface = BicubicSurface::build(&probed_map()).unwrap();
    let leveler = ToolpathLeveler::new(&surface, LevelingOptions::default());
    let (output, report) = leveler.level_file(&input, DEFAULT_MARKER).unwrap();

    assert_eq!(output, dir.path().join("board.LEV.nc"));
    assert_eq!(report.linear_moves, 2);
    assert_eq!(report.plunge_pairs, 1);
    assert_eq!(report.out_of_extent, 0);

    let leveled = fs::read_to_string(&output).unwrap();
    assert_eq!(
        leveled,
        "G21\nG90\nG0 X-5.0000 Y5.0000\nG1 Z-0.115 F60\nG1 X-25.0000 Y5.0000 Z-0.135 F200\nG1 X-25.0000 Y25.0000 Z-0.175\nG0 Z2\nM30\n"
    );
    assert_eq!(fs::read_to_string(&input).unwrap(), PROGRAM);
}

#[test]
fn test_releveling_output_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.nc");
    fs::write(&input, PROGRAM).unwrap();

    let surface = BicubicSurface::build(&probed_map()).unwrap();
    let leveler = ToolpathLeveler::new(&surface, LevelingOptions::default());
    let (first, _) = leveler.level_file(&input, DEFAULT_MARKER).unwrap();
    let (second, _) = leveler.level_file(&first, DEFAULT_MARKER).unwrap();

    assert_eq!(second, dir.path().join("board.LEV.LEV.nc"));
    assert_eq!(
        fs::read_to_string(&first).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn test_missing_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let surface = BicubicSurface::build(&probed_map()).unwrap();
    let leveler = ToolpathLeveler::new(&surface, LevelingOptions::default());

    let err = leveler
        .level_file(&dir.path().join("absent.nc"), DEFAULT_MARKER)
        .unwrap_err();
    assert!(matches!(err, Error::Toolpath(ToolpathError::MissingInput { .. })));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_strict_failure_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.nc");
    fs::write(&input, "G1 X1..5 Y2\n").unwrap();

    let surface = BicubicSurface::build(&probed_map()).unwrap();
    let leveler = ToolpathLeveler::new(
        &surface,
        LevelingOptions {
            mill_depth: 0.1,
            strict: true,
        },
    );

    assert!(leveler.level_file(&input, DEFAULT_MARKER).is_err());
    assert!(!dir.path().join("bad.LEV.nc").exists());
}

#[test]
fn test_surface_follows_probed_plane() {
    let surface = BicubicSurface::build(&probed_map()).unwrap();
    let z = surface.height_at(-15.0, 12.5);
    assert!((z - (0.001 * -15.0 - 0.002 * 12.5)).abs() < 1e-9);
}

use anyhow::Result;
use image::{Luma, Rgb, RgbImage};

use colony_watch::colony::{ColonyCounter, LaplacianKernel};
use colony_watch::ingest::{capture_frame, StreamConfig};

fn disc(image: &mut RgbImage, cx: i64, cy: i64, r: i64, color: Rgb<u8>) {
    for y in 0..image.height() as i64 {
        for x in 0..image.width() as i64 {
            if (x - cx) * (x - cx) + (y - cy) * (y - cy) <= r * r {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn plate_with_blobs(k: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(120, 120, Rgb([225, 215, 190]));
    for i in 0..k {
        let cx = 20 + (i % 4) as i64 * 26;
        let cy = 20 + (i / 4) as i64 * 26;
        disc(&mut image, cx, cy, 6, Rgb([40, 30, 20]));
    }
    image
}

#[test]
fn uniform_image_counts_zero() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = ColonyCounter::new(dir.path());
    let image = RgbImage::from_pixel(100, 100, Rgb([200, 200, 200]));

    let result = counter.count_image("blank", &image)?;
    assert_eq!(result.count, 0);

    let gray = image::open(&result.gray_path)?.to_luma8();
    assert!(gray.pixels().all(|p| *p == Luma([200])));
    assert_eq!(result.contours_path, dir.path().join("blank-0.png"));
    assert!(result.sharpened_path.exists());
    Ok(())
}

#[test]
fn bright_disc_on_black_counts_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = ColonyCounter::new(dir.path());
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    disc(&mut image, 50, 50, 10, Rgb([255, 255, 255]));

    let result = counter.count_image("circle", &image)?;
    assert_eq!(result.count, 1);
    assert!(dir.path().join("circle-1.png").exists());
    Ok(())
}

#[test]
fn dark_blobs_are_counted() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = ColonyCounter::new(dir.path());
    for k in [0u32, 1, 5] {
        let result = counter.count_image(&format!("plate{}", k), &plate_with_blobs(k))?;
        assert_eq!(result.count, k as usize, "plate with {} blobs", k);
    }
    Ok(())
}

#[test]
fn artifacts_are_written_with_expected_names() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = ColonyCounter::new(dir.path().join("out"));
    let result = counter.count_image("plate", &plate_with_blobs(3))?;

    let out = dir.path().join("out");
    assert_eq!(result.sharpened_path, out.join("plate-sharpened.png"));
    assert_eq!(result.gray_path, out.join("plate-gray.png"));
    assert_eq!(result.contours_path, out.join("plate-3.png"));
    for path in [&result.sharpened_path, &result.gray_path, &result.contours_path] {
        assert!(path.exists(), "{} missing", path.display());
    }

    let sharpened = image::open(&result.sharpened_path)?.to_rgb8();
    assert_eq!(sharpened.dimensions(), (120, 120));
    Ok(())
}

#[test]
fn counting_is_deterministic() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let counter = ColonyCounter::new(dir.path()).with_kernel(LaplacianKernel::Strong);
    let image = plate_with_blobs(6);

    let first = counter.count_image("again", &image)?;
    let first_annotated = std::fs::read(&first.contours_path)?;
    let second = counter.count_image("again", &image)?;

    assert_eq!(first.count, second.count);
    assert_eq!(first.threshold, second.threshold);
    assert_eq!(first_annotated, std::fs::read(&second.contours_path)?);
    Ok(())
}

#[test]
fn count_file_reads_from_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("2024-03-01_12-30-00.png");
    plate_with_blobs(4).save(&source)?;

    let counter = ColonyCounter::new(dir.path().join("artifacts"));
    let result = counter.count_file(&source)?;
    assert_eq!(result.count, 4);
    assert!(dir
        .path()
        .join("artifacts")
        .join("2024-03-01_12-30-00-4.png")
        .exists());
    Ok(())
}

#[test]
fn undecodable_file_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("broken.png");
    std::fs::write(&source, b"definitely not a png")?;

    let counter = ColonyCounter::new(dir.path());
    let err = counter.count_file(&source).unwrap_err();
    assert!(format!("{:#}", err).contains("failed to decode image"));
    assert!(!dir.path().join("broken-sharpened.png").exists());
    Ok(())
}

#[test]
fn unwritable_output_dir_is_an_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file")?;

    let counter = ColonyCounter::new(&blocker);
    assert!(counter.count_image("plate", &plate_with_blobs(1)).is_err());
    Ok(())
}

#[test]
fn stub_stream_frames_count_as_configured() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let frame = capture_frame(&StreamConfig {
        url: "stub://plate?colonies=5".to_string(),
        timeout: std::time::Duration::from_secs(1),
    })?;
    let saved = frame.save(dir.path())?;
    let result = ColonyCounter::new(dir.path()).count_file(&saved)?;
    assert_eq!(result.count, 5);
    Ok(())
}

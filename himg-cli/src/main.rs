use argh::FromArgs;
use himg::{ColorSpace, HimgDecodeContext, HimgEncodeContext};
use image::{DynamicImage, ImageBuffer, ImageFormat};
use std::{fs::File, io::BufReader, str::FromStr, time::Instant};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// HIMG cli encoder and decoder.
#[derive(FromArgs)]
struct Cli {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Encode(Encode),
    Decode(Decode),
    Info(Info),
}

/// Decodes a HIMG image.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// output format (png, jpg, bmp, tiff)
    #[argh(option)]
    format: Format,

    /// number of worker threads, 0 decodes on the main thread
    #[argh(option, default = "0")]
    threads: usize,

    /// the HIMG input file
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

/// Prints the header of a HIMG image.
#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
struct Info {
    /// the HIMG input file
    #[argh(positional)]
    input: String,
}

#[derive(Debug, Clone, Copy)]
enum Format {
    Png,
    Jpg,
    Bmp,
    Tiff,
}

impl Format {
    fn image_format(self) -> ImageFormat {
        match self {
            Format::Png => ImageFormat::Png,
            Format::Jpg => ImageFormat::Jpeg,
            Format::Bmp => ImageFormat::Bmp,
            Format::Tiff => ImageFormat::Tiff,
        }
    }
}

impl FromStr for Format {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(format) = s.eq_ignore_ascii_case("png").then_some(Format::Png)
               .or_else(|| s.eq_ignore_ascii_case("jpg").then_some(Format::Jpg))
               .or_else(|| s.eq_ignore_ascii_case("bmp").then_some(Format::Bmp))
               .or_else(|| s.eq_ignore_ascii_case("tiff").then_some(Format::Tiff))
        else { return Err("invalid string"); };

        Ok(format)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Cli { command } = argh::from_env();

    match command {
        Command::Encode(options) => encode(options),
        Command::Decode(options) => decode(options),
        Command::Info(options) => info(options),
    }
}

/// Encodes an image as HIMG.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// input format, optional (png, jpg, bmp, tiff)
    #[argh(option)]
    format: Option<Format>,

    /// quality from 0 to 100
    #[argh(option, default = "75")]
    quality: u8,

    /// low-res block size as log2, from 1 to 5
    #[argh(option, default = "himg::DEFAULT_BLOCK_SHIFT")]
    block_shift: u8,

    /// number of worker threads, 0 encodes on the main thread
    #[argh(option, default = "0")]
    threads: usize,

    /// code the color channels as given instead of as luma/chroma
    #[argh(switch)]
    plain: bool,

    /// the input file, a PNG, JPG, BMP or TIFF image
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

fn encode(options: Encode) -> Result<(), Box<dyn std::error::Error>> {
    let Encode {
        format,
        quality,
        block_shift,
        threads,
        plain,
        input,
        output,
    } = options;

    let image = match format {
        Some(format) => image::io::Reader::with_format(
            BufReader::new(File::open(&input)?),
            format.image_format(),
        )
        .decode()?,
        None => image::io::Reader::open(input)?
            .with_guessed_format()?
            .decode()?,
    };

    let width = image.width();
    let height = image.height();
    let color = image.color();
    debug!(?color, width, height, "loaded input image");
    let (num_channels, pixels) = match (color.has_color(), color.has_alpha()) {
        (false, false) => (1, image.into_luma8().into_raw()),
        (false, true) => (2, image.into_luma_alpha8().into_raw()),
        (true, false) => (3, image.into_rgb8().into_raw()),
        (true, true) => (4, image.into_rgba8().into_raw()),
    };

    println!("Encoding {width}x{height} image with {num_channels} channels");

    let color_space = if plain {
        ColorSpace::Plain
    } else {
        ColorSpace::YCbCr
    };
    let ctx = HimgEncodeContext::new(quality)?
        .with_color_space(color_space)
        .with_block_shift(block_shift)?
        .with_threads(threads)?;

    let start = Instant::now();
    let mut v = Vec::with_capacity(pixels.len() / 4);
    ctx.encode_to_vec(width, height, num_channels, &pixels, &mut v)?;
    let elapsed = start.elapsed();

    std::fs::write(&output, &v)?;
    println!(
        "Written {} bytes to `{output}` in {elapsed:.2?} ({:.2} bits per pixel)",
        v.len(),
        v.len() as f64 * 8.0 / (f64::from(width) * f64::from(height))
    );

    Ok(())
}

fn decode(options: Decode) -> Result<(), Box<dyn std::error::Error>> {
    let Decode {
        format,
        threads,
        input,
        output,
    } = options;

    let himg_input = std::fs::read(&input)?;
    if !himg::is_himg(&himg_input) {
        return Err(format!("`{input}` is not a HIMG image").into());
    }

    println!("Decoding `{input}`");

    let ctx = HimgDecodeContext::with_threads(threads)?;
    let start = Instant::now();
    let (header, pixels) = ctx.decode(&himg_input)?;
    let elapsed = start.elapsed();

    let (width, height) = (header.width, header.height);
    let image = match header.num_channels {
        1 => ImageBuffer::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8),
        2 => ImageBuffer::from_raw(width, height, pixels).map(DynamicImage::ImageLumaA8),
        3 => ImageBuffer::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
        4 => ImageBuffer::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8),
        _ => None,
    }
    .ok_or("failed to create image")?;

    debug!(?header, ?format, "writing output image");
    let image = match format {
        // JPEG has no alpha channel
        Format::Jpg if image.color().has_alpha() => DynamicImage::ImageRgb8(image.into_rgb8()),
        _ => image,
    };
    image.save_with_format(&output, format.image_format())?;

    println!("Written {width}x{height} image to `{output}`, decoded in {elapsed:.2?}");

    Ok(())
}

fn info(options: Info) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(&options.input)?;
    let header = HimgDecodeContext::decode_header(&data)?;

    println!("{}:", options.input);
    println!("  size:        {}x{}", header.width, header.height);
    println!("  channels:    {}", header.num_channels);
    println!("  color space: {}", header.color_space);
    println!(
        "  block size:  {0}x{0} ({1} block rows)",
        header.block_size(),
        header.block_rows()
    );
    println!("  stream size: {} bytes", data.len());

    Ok(())
}

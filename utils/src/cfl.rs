use std::collections::HashMap;
use std::path::{Path,PathBuf};
use std::fs::File;
use std::io::{self,Read,Write};
use byteorder::{ByteOrder,LittleEndian};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use num_complex::Complex64;

/*
    BART-style complex float files. A base path "foo" maps to "foo.hdr" (text dimensions header)
    and "foo.cfl" (interleaved little-endian f32 real/imag pairs, first dimension fastest).
*/

pub fn cfl_base_decode(cfl_base:&Path) -> (PathBuf,PathBuf) {
    (cfl_base.with_extension("hdr"),cfl_base.with_extension("cfl"))
}

pub fn load_cfl_header(cfl_base:&Path) -> io::Result<HashMap<String,String>> {
    let (hdr,_) = cfl_base_decode(cfl_base);
    let mut f = File::open(&hdr)?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    let lines:Vec<&str> = s.lines().collect();
    let mut h = HashMap::<String,String>::new();
    lines.iter().enumerate().for_each(|(i,line)|{
        if line.starts_with('#') {
            let value = lines.get(i+1).map(|v| v.to_string()).unwrap_or_default();
            h.insert(line.to_string(),value);
        }
    });
    Ok(h)
}

/// array dimensions from the header with trailing singleton dimensions removed
pub fn get_dims(cfl_base:&Path) -> io::Result<Vec<usize>> {
    let h = load_cfl_header(cfl_base)?;
    let d = h.get("# Dimensions").ok_or_else(||
        io::Error::new(io::ErrorKind::InvalidData,format!("no dimensions found in header for {:?}",cfl_base))
    )?;
    let mut dims = d.split_whitespace().map(|s| s.parse::<usize>()).collect::<Result<Vec<usize>,_>>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData,e))?;
    while dims.len() > 1 && dims.last() == Some(&1) {
        dims.pop();
    }
    Ok(dims)
}

pub fn write_cfl<S,D>(arr:&ArrayBase<S,D>,cfl_base:&Path) -> io::Result<()>
    where S:Data<Elem=Complex64>, D:Dimension {
    let (hdr,cfl) = cfl_base_decode(cfl_base);
    let mut dims:Vec<String> = arr.shape().iter().map(|d| d.to_string()).collect();
    while dims.len() < 5 {
        dims.push("1".to_string());
    }
    let mut f = File::create(hdr)?;
    f.write_all(format!("# Dimensions\n{}\n",dims.join(" ")).as_bytes())?;

    // iterating the transposed view walks the data first dimension fastest
    let flat:Vec<f32> = arr.t().iter().flat_map(|c| [c.re as f32,c.im as f32]).collect();
    let mut byte_buff:Vec<u8> = vec![0;flat.len()*4];
    LittleEndian::write_f32_into(&flat,&mut byte_buff);
    let mut f = File::create(cfl)?;
    f.write_all(&byte_buff)
}

pub fn read_cfl(cfl_base:&Path) -> io::Result<ArrayD<Complex64>> {
    let dims = get_dims(cfl_base)?;
    let (_,cfl) = cfl_base_decode(cfl_base);
    let mut f = File::open(cfl)?;
    let mut buf = Vec::<u8>::new();
    f.read_to_end(&mut buf)?;
    let numel:usize = dims.iter().product();
    if buf.len() != numel*8 {
        return Err(io::Error::new(io::ErrorKind::InvalidData,
            format!("expected {} bytes of data for dimensions {:?}, found {}",numel*8,dims,buf.len())
        ))
    }
    let mut fbuf:Vec<f32> = vec![0.0;numel*2];
    LittleEndian::read_f32_into(&buf,&mut fbuf);
    let data:Vec<Complex64> = fbuf.chunks_exact(2).map(|p| Complex64::new(p[0] as f64,p[1] as f64)).collect();
    let reversed:Vec<usize> = dims.iter().rev().cloned().collect();
    let arr = ArrayD::from_shape_vec(IxDyn(&reversed),data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData,e))?;
    Ok(arr.reversed_axes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn cfl_round_trip_keeps_layout(){
        let dir = std::env::temp_dir().join(format!("utils_cfl_test_{}",std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let base = dir.join("vol");
        let vol = Array3::from_shape_fn((2,3,4),|(i,j,k)| Complex64::new((i*100 + j*10 + k) as f64,-(k as f64)));
        write_cfl(&vol,&base).unwrap();

        assert_eq!(get_dims(&base).unwrap(),vec![2,3,4]);
        let hdr = std::fs::read_to_string(base.with_extension("hdr")).unwrap();
        assert_eq!(hdr,"# Dimensions\n2 3 4 1 1\n");

        // first dimension is fastest on disk
        let raw = std::fs::read(base.with_extension("cfl")).unwrap();
        assert_eq!(LittleEndian::read_f32(&raw[8..12]),100.0);

        let back = read_cfl(&base).unwrap();
        assert_eq!(back.shape(),&[2,3,4]);
        assert_eq!(back.into_dimensionality::<ndarray::Ix3>().unwrap(),vol);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
